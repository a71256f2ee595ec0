use std::path::PathBuf;

use aligner_core::coords::{Rect, ViewTransform};
use aligner_core::crop::{CropRequest, CropTarget};
use anyhow::Result;
use clap::Args;

use crate::summary::print_crop_summary;

#[derive(Args)]
pub struct CropArgs {
    /// Project file (TOML)
    pub project: PathBuf,

    /// Region in draw coordinates: X,Y,W,H
    #[arg(long)]
    pub rect: String,

    /// Draw px per preview px of the view the region was drawn in
    #[arg(long, default_value = "1.0")]
    pub draw_scale: f64,

    /// View pan in preview px: X,Y
    #[arg(long, default_value = "0,0")]
    pub pan: String,

    /// Crop the aligned exports or the untouched sources
    #[arg(long, default_value = "aligned")]
    pub target: CropTarget,
}

pub fn run(args: &CropArgs) -> Result<()> {
    let [x, y, w, h] = super::parse_list::<4>(&args.rect)?;
    let [pan_x, pan_y] = super::parse_list::<2>(&args.pan)?;
    anyhow::ensure!(args.draw_scale > 0.0, "--draw-scale must be positive");

    let (_project, mut session) = super::open_project(&args.project)?;
    let request = CropRequest {
        rect: Rect::new(x, y, w, h),
        view: ViewTransform::new(args.draw_scale, pan_x, pan_y),
        target: args.target,
    };

    let pb = super::progress_bar(session.files().len(), "Cropping")?;
    let summary = session.crop(&request, |done, _| pb.set_position(done as u64))?;
    pb.finish_with_message("Done");

    print_crop_summary(&summary, args.target);
    Ok(())
}
