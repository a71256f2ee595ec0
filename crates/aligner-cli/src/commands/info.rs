use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::summary::print_project_summary;

#[derive(Args)]
pub struct InfoArgs {
    /// Project file (TOML)
    pub project: PathBuf,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let (project, session) = super::open_project(&args.project)?;
    print_project_summary(&project, &session);
    Ok(())
}
