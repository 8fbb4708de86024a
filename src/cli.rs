use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::path::PathBuf;

use crate::configparser::DEFAULT_CONFIG_FILE;
use crate::policies::PolicyAction;

#[derive(Parser, Debug)]
/// Deploy, monitor and network-isolate the football intro app on a local kind cluster.
pub struct Cli {
    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,

    #[arg(
        short,
        long,
        global = true,
        value_name = "PATH",
        env = "KINDSTACK_CONFIG",
        default_value = DEFAULT_CONFIG_FILE,
        help = "Config file (defaults are used for anything it leaves out)"
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate kindstack.yaml and check the files it points to exist.
    Validate,

    /// Check that docker, kind, kubectl and the cluster API are reachable.
    CheckAccess,

    /// Create the kind cluster, optionally with Cilium as the network plugin.
    ClusterSetup {
        #[arg(long, help = "Replace the default CNI with Cilium")]
        cilium: bool,

        #[arg(long, help = "Delete and recreate the cluster if it already exists")]
        recreate: bool,
    },

    /// Deploy the full stack, provisioning whatever is missing first.
    ///
    /// Also builds the app image and loads it into the cluster, unless --no-build is specified.
    Deploy {
        #[arg(long, help = "Skip building and loading the app image")]
        no_build: bool,

        #[arg(long, help = "Set up Cilium if it is not installed")]
        cilium: bool,

        #[arg(long, help = "Deploy Prometheus and Grafana if they are not running")]
        monitoring: bool,
    },

    /// (Re)deploy the exporter, Prometheus and Grafana, and wire up Grafana.
    Monitoring {
        #[arg(long, help = "Do not create the app dashboard")]
        no_dashboard: bool,
    },

    /// Create or overwrite the app dashboard in Grafana.
    Dashboard,

    /// Apply or remove network policies.
    Policies {
        #[arg(value_enum, default_value = "all")]
        action: PolicyAction,
    },

    /// Check network policies by probing the app from test pods.
    TestPolicies,

    /// Forward the configured services to localhost until interrupted.
    PortForward,

    /// Show deployments, pods, services and network policies.
    Status,
}
