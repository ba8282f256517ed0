use std::process::ExitCode;

use clap::Parser;

use picgle::cli;
use picgle::logger;

fn main() -> ExitCode {
    // Session log overwrites the previous run's file
    logger::init();

    let args = cli::CliArgs::parse();
    cli::run(args)
}
