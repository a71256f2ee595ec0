use std::path::PathBuf;

use aligner_core::project::ProjectConfig;
use anyhow::{Context, Result};
use clap::Args;

#[derive(Args)]
pub struct ConfigArgs {
    /// Write the project file instead of printing it
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Print or save a default project file as TOML.
pub fn run(args: &ConfigArgs) -> Result<()> {
    let mut config = ProjectConfig::default();
    config.paths.base_image = Some(PathBuf::from("base.jpg"));
    let toml_str = config.to_toml_string()?;

    if let Some(ref path) = args.output {
        std::fs::write(path, &toml_str)
            .with_context(|| format!("Failed to write project to {}", path.display()))?;
        println!("Default project saved to {}", path.display());
    } else {
        print!("{}", toml_str);
    }

    Ok(())
}
