use clap::Parser;
use owo_colors::OwoColorize;

mod cli;

use cli::args::Args;
use cli::op::{Op, OpContext};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let ctx = match OpContext::new(&args.remote, args.config.clone()) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    match args.command.execute(&ctx).await {
        Ok(output) => println!("{output}"),
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}
