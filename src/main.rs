use clap::Parser;
use simplelog::*;

use kindstack::cli::{Cli, Commands};
use kindstack::commands;
use kindstack::configparser::set_config_path;

fn main() {
    println!();

    let cli = Cli::parse();

    setup_logging(cli.verbose.log_level_filter());

    debug!("args: {:?}", cli);

    set_config_path(&cli.config);

    // dispatch commands
    match &cli.command {
        Commands::Validate => commands::validate::run(),

        Commands::CheckAccess => commands::check_access::run(),

        Commands::ClusterSetup { cilium, recreate } => commands::cluster_setup::run(cilium, recreate),

        Commands::Deploy {
            no_build,
            cilium,
            monitoring,
        } => commands::deploy::run(no_build, cilium, monitoring),

        Commands::Monitoring { no_dashboard } => commands::monitoring::run(no_dashboard),

        Commands::Dashboard => commands::dashboard::run(),

        Commands::Policies { action } => commands::policies::run(action),

        Commands::TestPolicies => commands::test_policies::run(),

        Commands::PortForward => commands::port_forward::run(),

        Commands::Status => commands::status::run(),
    }
}

fn setup_logging(log_level: LevelFilter) {
    let log_config = ConfigBuilder::new()
        .set_time_level(LevelFilter::Trace)
        .build();

    if let Err(e) = TermLogger::init(
        log_level,
        log_config,
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ) {
        eprintln!("could not set up logging: {e}");
    }
}
