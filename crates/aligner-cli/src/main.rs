mod commands;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "aligner", about = "Manual image alignment and similarity scoring")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print or save a default project file
    Config(commands::config::ConfigArgs),
    /// Show base image, preview scale and per-image modes
    Info(commands::info::InfoArgs),
    /// Replay an edit script against a project
    Edit(commands::edit::EditArgs),
    /// Render the composed preview of one image
    Preview(commands::preview::PreviewArgs),
    /// Export full-resolution aligned images
    Save(commands::save::SaveArgs),
    /// Crop the base and every image to one region
    Crop(commands::crop::CropArgs),
    /// Score every image against the base
    Score(commands::score::ScoreArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Config(args) => commands::config::run(args),
        Commands::Info(args) => commands::info::run(args),
        Commands::Edit(args) => commands::edit::run(args),
        Commands::Preview(args) => commands::preview::run(args),
        Commands::Save(args) => commands::save::run(args),
        Commands::Crop(args) => commands::crop::run(args),
        Commands::Score(args) => commands::score::run(args),
    }
}
