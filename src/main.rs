use clap::Parser;
use splitfold::cli::{Cli, Output};

fn main() {
    let cli = Cli::parse();
    if let Err(e) = cli.run() {
        Output::new(false, false).error(&format!("{e:#}"));
        std::process::exit(1);
    }
}
