use std::path::PathBuf;

use aligner_core::io::save_png;
use anyhow::{Context, Result};
use clap::Args;

#[derive(Args)]
pub struct PreviewArgs {
    /// Project file (TOML)
    pub project: PathBuf,

    /// Index of the source image to render
    #[arg(long, default_value = "0")]
    pub image: usize,

    /// Blend the aligned image over the base
    #[arg(long)]
    pub overlay: bool,

    /// Overlay opacity (0-1)
    #[arg(long)]
    pub alpha: Option<f32>,

    /// Do not draw the image outline
    #[arg(long)]
    pub no_outline: bool,

    /// Draw a reference grid every STEP preview pixels
    #[arg(long)]
    pub grid: Option<u32>,

    /// Output PNG path
    #[arg(short, long, default_value = "preview.png")]
    pub output: PathBuf,
}

pub fn run(args: &PreviewArgs) -> Result<()> {
    let (_project, mut session) = super::open_project(&args.project)?;
    super::select_image(&mut session, args.image)?;

    let mut options = session.config().render_options();
    options.overlay = args.overlay;
    if let Some(alpha) = args.alpha {
        options.alpha = alpha;
    }
    if args.no_outline {
        options.outline = false;
    }
    if args.grid.is_some() {
        options.grid_step = args.grid;
    }

    let rendered = session.render_current(&options)?;
    if let Some(e) = rendered.geometry_error {
        eprintln!("Perspective ignored: {e}");
    }
    save_png(&rendered.image, &args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    let [tl, tr, br, bl] = rendered.outline.corners;
    println!(
        "Preview {}x{} saved to {}",
        rendered.image.width(),
        rendered.image.height(),
        args.output.display()
    );
    println!(
        "Outline  ({:.1},{:.1}) ({:.1},{:.1}) ({:.1},{:.1}) ({:.1},{:.1})",
        tl.x, tl.y, tr.x, tr.y, br.x, br.y, bl.x, bl.y
    );
    Ok(())
}
