use clap::Parser;
use env_logger::{Builder, Env};
use log::{debug, LevelFilter};
use std::error::Error;

mod args;
mod dashboard;

fn main() {
    let args = args::Args::parse();

    let mut builder = Builder::from_env(Env::default().default_filter_or("warn"));
    if args.verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.init();
    debug!("args: {:?}", args);

    if let Err(e) = dashboard::run_command(&args) {
        eprintln!("Error: {}", e);
        let mut source = e.source();
        while let Some(s) = source {
            eprintln!("  caused by: {}", s);
            source = s.source();
        }
        std::process::exit(1);
    }
}
