use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod frames;
mod keys;

#[derive(Parser)]
#[command(name = "proctor", version, about = "Proctor CLI: replay recorded sessions offline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the head-movement detector over a sequence of images
    Frames(frames::FramesArgs),
    /// Replay a JSON-lines key event log through the keyboard tracker
    Keys(keys::KeysArgs),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Frames(args) => frames::run(args),
        Command::Keys(args) => keys::run(args),
    }
}
