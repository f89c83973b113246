use std::process::ExitCode;

use clap::Parser;

mod cli;

use cli::Cli;

fn main() -> ExitCode {
    // Usage errors print the usage line and exit with status 2 before anything binds
    let cli = Cli::parse();

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match tcp_chat::start_server("tcp_chat", config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error creating the server: {}", e);
            ExitCode::FAILURE
        }
    }
}
