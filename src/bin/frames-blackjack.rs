use std::path::PathBuf;
use clap::Parser;
use log::info;
use msgbox::IconType;
use frames_blackjack::{init_logging, run};
use frames_blackjack::error::{error_msgbox, AppRunError, ConfigError};

#[derive(Parser, Debug)]
#[command(version, about = "Pairs with a FRAMES device and opens the blackjack card assistant")]
struct Args {
    /// Path to the JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log debug messages
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), AppRunError> {
    let args = Args::parse();

    init_logging(if args.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info });
    info!(concat!("Blackjack for FRAMES ", env!("CARGO_PKG_VERSION")));

    match run(args.config) {
        Err(AppRunError::ConfigError { source: ConfigError::CanNotLock { .. } }) => {
            if let Err(err) = msgbox::create(
                concat!("Blackjack for FRAMES ", env!("CARGO_PKG_VERSION")),
                "This application has already been started",
                IconType::Error,
            ) {
                eprintln!("Failed to create msgbox: {:?}", err);
            }
            Ok(())
        },
        Err(err) => {
            error_msgbox("Unexpected error", &err);
            Err(err)
        }
        Ok(_) => Ok(())
    }
}
