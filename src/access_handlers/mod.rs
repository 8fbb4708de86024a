pub mod docker;
pub mod kube;
pub mod tools;
