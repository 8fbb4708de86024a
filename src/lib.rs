pub mod access_handlers;
pub mod builder;
pub mod cli;
pub mod clients;
pub mod cluster;
pub mod commands;
pub mod configparser;
pub mod deploy;
pub mod grafana;
pub mod interrupt;
pub mod policies;
pub mod portforward;
pub mod readiness;
pub mod utils;

#[cfg(test)]
mod tests;
