use clap::{CommandFactory, Parser};
use log::{error, info};
use mirrorfwd::configuration::config::{Args, Config};
use mirrorfwd::controller::controller_handler::Controller;
use mirrorfwd::error_handling::types::ConfigError;
use mirrorfwd::logging;
use std::env;
use std::process;

fn print_usage() {
    let _ = Args::command().print_help();
    println!();
}

#[tokio::main]
async fn main() {
    // Without any argument there is nothing to forward: show usage and leave quietly.
    if env::args().len() <= 1 {
        print_usage();
        return;
    }

    let args = Args::parse();
    let config = match Config::from_args(args) {
        Ok(config) => config,
        Err(ConfigError::Invalid(errors)) => {
            for e in errors {
                eprintln!("{}", e);
            }
            print_usage();
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Unable to import configuration: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = logging::init(&config.log) {
        eprintln!("Unable to set up logging: {}", e);
        process::exit(1);
    }

    info!("Configuration imported successfully");

    let controller = match Controller::new(config).await {
        Ok(controller) => controller,
        Err(e) => {
            error!("Unable to create a controller instance: {}, exiting...", e);
            process::exit(1);
        }
    };

    info!("Spawning the controller");
    if let Err(e) = controller.run().await {
        error!("Error occured in the controller process: {}, exiting...", e);
        process::exit(1);
    }
}
