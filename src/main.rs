use clap::Parser;
use indigraph::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    indigraph::logging::init();
    run(Cli::parse())
}
