use std::path::PathBuf;
use std::time::Duration;

use aligner_core::similarity::{SimilarityResult, SimilarityScheduler};
use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use crate::summary::print_score_table;

#[derive(Args)]
pub struct ScoreArgs {
    /// Project file (TOML)
    pub project: PathBuf,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    /// Worker threads (default: all cores but one)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Give up waiting for a single result after this many seconds
    #[arg(long, default_value = "120")]
    pub timeout: u64,
}

#[derive(Serialize)]
pub struct ScoreRow {
    pub image: String,
    #[serde(flatten)]
    pub result: SimilarityResult,
}

pub fn run(args: &ScoreArgs) -> Result<()> {
    let (project, mut session) = super::open_project(&args.project)?;

    let scheduler = match args.threads {
        Some(n) => SimilarityScheduler::with_threads(project.similarity.clone(), n)?,
        None => SimilarityScheduler::new(project.similarity.clone())?,
    };
    let jobs = session.scoring_jobs();
    let total = scheduler.schedule_all(jobs);

    let pb = super::progress_bar(total, "Scoring")?;
    for done in 1..=total {
        scheduler
            .recv_timeout(Duration::from_secs(args.timeout))
            .with_context(|| format!("No score received after {}s", args.timeout))?;
        pb.set_position(done as u64);
    }
    pb.finish_and_clear();

    let rows: Vec<ScoreRow> = session
        .files()
        .iter()
        .map(|path| ScoreRow {
            image: project.params_key(path),
            result: scheduler.cached(path).unwrap_or_else(SimilarityResult::zero),
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print_score_table(&rows);
    }
    Ok(())
}
