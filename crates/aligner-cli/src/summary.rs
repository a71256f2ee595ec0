use aligner_core::crop::{CropSummary, CropTarget};
use aligner_core::project::ProjectConfig;
use aligner_core::session::EditingSession;
use console::Style;

use crate::commands::score::ScoreRow;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    mode: Style,
    disabled: Style,
    path: Style,
    good: Style,
    fair: Style,
    poor: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            mode: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
            good: Style::new().green().bold(),
            fair: Style::new().yellow(),
            poor: Style::new().red(),
        }
    }

    fn score(&self, percent: u32) -> &Style {
        if percent >= 80 {
            &self.good
        } else if percent >= 50 {
            &self.fair
        } else {
            &self.poor
        }
    }
}

fn print_title(s: &Styles, title: &str) {
    println!();
    println!("  {}", s.title.apply_to(title));
    println!(
        "  {}",
        s.title.apply_to("\u{2550}".repeat(title.chars().count()))
    );
    println!();
}

pub fn print_project_summary(project: &ProjectConfig, session: &EditingSession) {
    let s = Styles::new();
    print_title(&s, "Alignment Project");

    if let Some(base) = session.base_path() {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Base"),
            s.path.apply_to(base.display())
        );
    }
    println!(
        "  {:<14}{}",
        s.label.apply_to("Sources"),
        s.path.apply_to(project.source_dir().display())
    );
    for (label, dir) in [("Align out", project.align_dir()), ("Crop out", project.crop_dir())] {
        match dir {
            Some(d) => println!(
                "  {:<14}{}",
                s.label.apply_to(label),
                s.path.apply_to(d.display())
            ),
            None => println!(
                "  {:<14}{}",
                s.label.apply_to(label),
                s.disabled.apply_to("not set")
            ),
        }
    }
    println!();

    if let Ok(ctx) = session.scale() {
        println!("  {}", s.header.apply_to("Preview"));
        println!(
            "    {:<12}{}",
            s.label.apply_to("Full"),
            s.value.apply_to(format!("{}x{}", ctx.full_width, ctx.full_height))
        );
        println!(
            "    {:<12}{}",
            s.label.apply_to("Preview"),
            s.value
                .apply_to(format!("{}x{}", ctx.preview_width, ctx.preview_height))
        );
        println!(
            "    {:<12}{}",
            s.label.apply_to("Scale"),
            s.value.apply_to(format!("{:.4}", ctx.preview_scale))
        );
        println!();
    }

    println!(
        "  {} {}",
        s.header.apply_to("Images"),
        s.label.apply_to(format!("({})", session.files().len()))
    );
    for (i, path) in session.files().iter().enumerate() {
        let params = session.params(path);
        println!(
            "    {:>3}. {:<32} {}  {}",
            s.label.apply_to(i),
            project.params_key(path),
            s.mode.apply_to(session.mode(path)),
            s.label.apply_to(format!(
                "tx {:.1} ty {:.1} rot {:.2} scale {:.3}",
                params.tx, params.ty, params.theta, params.scale
            ))
        );
    }
    println!();
}

pub fn print_crop_summary(summary: &CropSummary, target: CropTarget) {
    let s = Styles::new();
    print_title(&s, "Crop");

    if let Some(r) = summary.rect {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Region"),
            s.value
                .apply_to(format!("{}x{} at ({}, {})", r.width, r.height, r.x, r.y))
        );
    }
    println!(
        "  {:<14}{}",
        s.label.apply_to("Target"),
        s.mode.apply_to(target)
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Written"),
        s.value.apply_to(format!("{} of {}", summary.written, summary.total))
    );
    if summary.skipped > 0 {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Skipped"),
            s.poor.apply_to(summary.skipped)
        );
    }
    if summary.warped_on_the_fly > 0 {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Warped"),
            s.disabled
                .apply_to(format!("{} without export", summary.warped_on_the_fly))
        );
    }
    println!();
}

pub fn print_score_table(rows: &[ScoreRow]) {
    let s = Styles::new();
    print_title(&s, "Similarity");

    println!(
        "  {:<32} {:>6}  {:>5} {:>5} {:>5} {:>5} {:>5}",
        s.header.apply_to("Image"),
        s.header.apply_to("Score"),
        s.label.apply_to("SSIM"),
        s.label.apply_to("Corr"),
        s.label.apply_to("Hist"),
        s.label.apply_to("ORB"),
        s.label.apply_to("PSNR")
    );
    for row in rows {
        let r = &row.result;
        let pct = r.percent();
        println!(
            "  {:<32} {:>6}  {:>5.2} {:>5.2} {:>5.2} {:>5.2} {:>5.2}",
            row.image,
            s.score(pct).apply_to(format!("{pct}%")),
            r.ssim,
            r.corr,
            r.hist,
            r.orb,
            r.psnr
        );
    }
    println!();
}
