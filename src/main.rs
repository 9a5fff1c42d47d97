use log::{error, info, LevelFilter};
use stdiogate::configuration::Config;
use stdiogate::controller::Controller;

#[tokio::main]
async fn main() {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    logger(config.log_level.to_filter()).init();

    info!("stdiogate v{}", env!("CARGO_PKG_VERSION"));

    let controller = match Controller::new(config) {
        Ok(controller) => controller,
        Err(e) => {
            error!("Unable to create a controller instance: {}, exiting...", e);
            std::process::exit(1);
        }
    };

    match controller.run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("Error occured in the controller process: {}, exiting...", e);
            std::process::exit(1);
        }
    }
}

/// `level` as the default, with `RUST_LOG` directives applied on top.
// https://docs.rs/env_logger/latest/env_logger/
fn logger(level: LevelFilter) -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(level)
        .parse_default_env()
        .format_target(false);
    builder
}
