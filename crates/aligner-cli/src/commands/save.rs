use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

#[derive(Args)]
pub struct SaveArgs {
    /// Project file (TOML)
    pub project: PathBuf,

    /// Index of the source image to export
    #[arg(long, default_value = "0", conflicts_with = "all")]
    pub image: usize,

    /// Export every source image
    #[arg(long)]
    pub all: bool,
}

pub fn run(args: &SaveArgs) -> Result<()> {
    let (_project, mut session) = super::open_project(&args.project)?;

    if !args.all {
        super::select_image(&mut session, args.image)?;
        let out = session.save_current_aligned()?;
        println!("Aligned image saved to {}", out.display());
        return Ok(());
    }

    let total = session.files().len();
    let pb = super::progress_bar(total, "Exporting")?;
    let written = session.save_all_aligned(|done, _| pb.set_position(done as u64))?;
    pb.finish_with_message("Done");

    println!("\n{} of {} aligned image(s) written", written.len(), total);
    Ok(())
}
