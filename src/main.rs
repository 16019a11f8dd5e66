use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use warden::configuration::config::{Config, CONFIG_ENV_VAR};
use warden::controller::controller_handler::Controller;

#[derive(Parser)]
#[command(name = "warden")]
#[command(version = "0.1.0")]
#[command(about = "Protective state engine for a game server: sessions, brute-force guard, connection reputation")]
struct Args {
    /// TOML configuration file; defaults are used when absent
    #[arg(short, long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Dashboard port, overriding the configuration file
    #[arg(short, long)]
    port: Option<u16>,
}

fn load_config(args: &Args) -> Config {
    let config = match &args.config {
        Some(path) => Config::from_file(path),
        None => {
            info!("No configuration file given, using defaults");
            Ok(Config::default())
        }
    };

    let mut config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Unable to import configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(port) = args.port {
        config.web.port = port;
    }
    config
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    println!(
        "
==============================================================================
                    warden v0.1.0 - game server protection
==============================================================================
"
    );

    let args = Args::parse();

    info!("Importing configuration");
    let config = load_config(&args);
    info!("Configuration imported successfully");

    let mut controller = match Controller::new(config) {
        Ok(controller) => controller,
        Err(e) => {
            error!("Unable to create a controller instance: {}, exiting...", e);
            std::process::exit(1);
        }
    };

    let result = tokio::spawn(async move {
        info!("Spawning the controller");
        controller.run().await
    });

    match result.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!("Error occured in the controller process: {}, exiting...", e);
            std::process::exit(1);
        }
        Err(e) => {
            error!("Error joining at the end of execution: {}", e);
            std::process::exit(1);
        }
    }
}
