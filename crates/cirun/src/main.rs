use clap::error::ErrorKind;
use clap::Parser;
use cirun_core::errors::{exit_codes, CirunError};

mod cli;
mod commands;
mod runtime_utils;
mod ui;

#[tokio::main]
async fn main() {
    // Clap reports parse errors with status 2, which is reserved for a declined prompt
    let parsed = match cli::Cli::try_parse() {
        Ok(parsed) => parsed,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => exit_codes::SUCCESS,
                _ => exit_codes::USAGE,
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    let code = match parsed.dispatch().await {
        Ok(code) => code,
        Err(err) => {
            if let Some(cirun_error) = err.downcast_ref::<CirunError>() {
                cirun_core::dispatcher::report(cirun_error);
                if !cirun_core::logging::is_initialized() {
                    eprintln!("Error: {}", cirun_error);
                }
                cirun_error.exit_code()
            } else {
                eprintln!("Error: {:#}", err);
                exit_codes::LOGIC_FAILURE
            }
        }
    };

    std::process::exit(code);
}
