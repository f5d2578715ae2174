use std::process::ExitCode;

use clap::Parser;
use postal_extremes::cli::{self, Args};

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(error) => {
            // Handled here instead of error.exit() to keep usage errors at code 1.
            error.print().ok();
            return match error.use_stderr() {
                true => ExitCode::from(cli::EXIT_USAGE),
                false => ExitCode::from(cli::EXIT_SUCCESS),
            };
        }
    };

    cli::setup_logging(&args);

    let stdout = std::io::stdout();
    let mut lock = stdout.lock();

    match cli::run(&args, &mut lock) {
        Ok(()) => ExitCode::from(cli::EXIT_SUCCESS),
        Err(error) => {
            eprintln!("Error: {:#}", error);
            ExitCode::from(cli::exit_code(&error))
        }
    }
}
