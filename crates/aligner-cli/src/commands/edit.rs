use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use aligner_core::project::{EditingConfig, ProjectConfig};
use aligner_core::session::{EditCommand, EditingSession};
use aligner_core::similarity::{Debouncer, SimilarityResult, SimilarityScheduler};
use anyhow::{bail, ensure, Context, Result};
use clap::Args;
use tracing::debug;

#[derive(Args)]
pub struct EditArgs {
    /// Project file (TOML)
    pub project: PathBuf,

    /// Edit script, one command per line
    #[arg(long)]
    pub script: PathBuf,

    /// Write the resulting parameters back into the project file
    #[arg(long)]
    pub save: bool,

    /// Score the current image while replaying, and report its final score
    #[arg(long)]
    pub score: bool,
}

/// Debounced background scoring, ticked after every script step.
struct LiveScore {
    scheduler: SimilarityScheduler,
    debouncer: Debouncer,
}

impl LiveScore {
    fn new(project: &ProjectConfig) -> Result<Self> {
        Ok(Self {
            scheduler: SimilarityScheduler::new(project.similarity.clone())?,
            debouncer: Debouncer::from_millis(project.similarity.debounce_ms),
        })
    }

    fn tick(&mut self, session: &mut EditingSession) -> Result<()> {
        if let Some(update) =
            session.poll_scoring(&mut self.debouncer, &self.scheduler, Instant::now())?
        {
            debug!(path = %update.path.display(), score = update.result.score, "Live score");
        }
        Ok(())
    }

    /// Score of the current image under its final params.
    fn settle(&mut self, session: &mut EditingSession, path: &Path) -> Result<SimilarityResult> {
        let signature = session.params(path).signature(&session.default_quad()?);
        let deadline = Instant::now() + Duration::from_secs(120);
        loop {
            if let Some(result) = self.scheduler.cached_for(path, signature) {
                return Ok(result);
            }
            if let Some(update) =
                session.poll_scoring(&mut self.debouncer, &self.scheduler, Instant::now())?
            {
                return Ok(update.result);
            }
            ensure!(Instant::now() < deadline, "No similarity score received");
            thread::sleep(Duration::from_millis(20));
        }
    }
}

/// One script line.
#[derive(Clone, Copy, Debug, PartialEq)]
enum ScriptStep {
    Edit(EditCommand),
    Perspective(bool),
    Select(usize),
}

pub fn run(args: &EditArgs) -> Result<()> {
    let (mut project, mut session) = super::open_project(&args.project)?;
    let script = std::fs::read_to_string(&args.script)
        .with_context(|| format!("Failed to read script {}", args.script.display()))?;

    let mut live = if args.score {
        Some(LiveScore::new(&project)?)
    } else {
        None
    };

    let mut applied = 0usize;
    for (n, line) in script.lines().enumerate() {
        let Some(step) = parse_line(line, session.config())
            .with_context(|| format!("{}:{}", args.script.display(), n + 1))?
        else {
            continue;
        };
        if run_step(&mut session, step)
            .with_context(|| format!("{}:{}: '{}'", args.script.display(), n + 1, line.trim()))?
        {
            applied += 1;
        }
        if let Some(live) = live.as_mut() {
            live.tick(&mut session)?;
        }
    }
    println!("{applied} edit(s) applied");

    for path in session.files() {
        let params = session.params(path);
        println!(
            "  {:<32} tx {:>8.2}  ty {:>8.2}  rot {:>7.3}  scale {:.4}  {}",
            project.params_key(path),
            params.tx,
            params.ty,
            params.theta,
            params.scale,
            session.mode(path)
        );
    }

    if let Some(live) = live.as_mut() {
        if let Some(path) = session.current_path().map(Path::to_path_buf) {
            let result = live.settle(&mut session, &path)?;
            println!("{}: {}", project.params_key(&path), result.summary());
        }
    }

    if args.save {
        session.write_params(&mut project);
        project.save(&args.project)?;
        println!("Parameters saved to {}", args.project.display());
    }
    Ok(())
}

fn run_step(session: &mut EditingSession, step: ScriptStep) -> Result<bool> {
    match step {
        ScriptStep::Edit(cmd) => Ok(session.apply(cmd)?),
        ScriptStep::Perspective(on) => {
            if session.current_mode().is_editing_perspective() == on {
                return Ok(false);
            }
            Ok(session.apply(EditCommand::TogglePerspective)?)
        }
        ScriptStep::Select(index) => {
            super::select_image(session, index)?;
            Ok(true)
        }
    }
}

/// Parse one script line; blank lines and `#` comments yield `None`.
fn parse_line(line: &str, cfg: &EditingConfig) -> Result<Option<ScriptStep>> {
    let line = line.split('#').next().unwrap_or("").trim();
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();
    let num = |i: usize| -> Result<f64> {
        let word = args
            .get(i)
            .with_context(|| format!("'{head}' expects argument {}", i + 1))?;
        word.parse::<f64>()
            .with_context(|| format!("'{word}' is not a number"))
    };
    let steps = |default: f64| -> Result<f64> {
        match args.first() {
            Some(_) => Ok(num(0)? * default),
            None => Ok(default),
        }
    };
    let edit =
        |cmd: EditCommand| -> Result<Option<ScriptStep>> { Ok(Some(ScriptStep::Edit(cmd))) };

    match head.to_ascii_lowercase().as_str() {
        "move" => edit(EditCommand::Translate {
            dx: num(0)?,
            dy: num(1)?,
        }),
        "left" => edit(EditCommand::Translate {
            dx: -steps(cfg.move_step)?,
            dy: 0.0,
        }),
        "right" => edit(EditCommand::Translate {
            dx: steps(cfg.move_step)?,
            dy: 0.0,
        }),
        "up" => edit(EditCommand::Translate {
            dx: 0.0,
            dy: -steps(cfg.move_step)?,
        }),
        "down" => edit(EditCommand::Translate {
            dx: 0.0,
            dy: steps(cfg.move_step)?,
        }),
        "rotate" => match args.first().copied() {
            Some("ccw") => edit(EditCommand::Rotate {
                degrees: cfg.rotate_step,
            }),
            Some("cw") => edit(EditCommand::Rotate {
                degrees: -cfg.rotate_step,
            }),
            _ => edit(EditCommand::Rotate { degrees: num(0)? }),
        },
        "zoom" => {
            let factor = match args.first().copied() {
                Some("in") => 1.0 + cfg.scale_step,
                Some("out") => 1.0 - cfg.scale_step,
                Some("fine-in") => 1.0 + cfg.fine_scale_step,
                Some("fine-out") => 1.0 - cfg.fine_scale_step,
                _ => num(0)?,
            };
            edit(EditCommand::Scale { factor })
        }
        "persp" => match args.first().copied() {
            Some("on") => Ok(Some(ScriptStep::Perspective(true))),
            Some("off") => Ok(Some(ScriptStep::Perspective(false))),
            None | Some("toggle") => edit(EditCommand::TogglePerspective),
            Some(other) => bail!("'persp' expects on, off or toggle, got '{other}'"),
        },
        "corner" => edit(EditCommand::SelectCorner(num(0)? as usize)),
        "nudge" => edit(EditCommand::NudgeCorner {
            dx: num(0)? * cfg.corner_step,
            dy: num(1)? * cfg.corner_step,
        }),
        "undo" => edit(EditCommand::Undo),
        "redo" => edit(EditCommand::Redo),
        "reset" => edit(EditCommand::Reset),
        "next" => edit(EditCommand::Next),
        "prev" | "previous" => edit(EditCommand::Previous),
        "begin" => edit(EditCommand::BeginGesture),
        "end" => edit(EditCommand::EndGesture),
        "image" => Ok(Some(ScriptStep::Select(num(0)? as usize))),
        other => bail!("unknown command '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Option<ScriptStep> {
        parse_line(line, &EditingConfig::default()).unwrap()
    }

    #[test]
    fn test_blank_and_comment_lines() {
        assert_eq!(parse(""), None);
        assert_eq!(parse("   # nothing here"), None);
    }

    #[test]
    fn test_explicit_amounts() {
        assert_eq!(
            parse("move 10 -5"),
            Some(ScriptStep::Edit(EditCommand::Translate {
                dx: 10.0,
                dy: -5.0
            }))
        );
        assert_eq!(
            parse("rotate 2  # degrees"),
            Some(ScriptStep::Edit(EditCommand::Rotate { degrees: 2.0 }))
        );
        assert_eq!(
            parse("ZOOM 1.05"),
            Some(ScriptStep::Edit(EditCommand::Scale { factor: 1.05 }))
        );
    }

    #[test]
    fn test_configured_steps() {
        let cfg = EditingConfig::default();
        assert_eq!(
            parse("left 3"),
            Some(ScriptStep::Edit(EditCommand::Translate {
                dx: -3.0 * cfg.move_step,
                dy: 0.0
            }))
        );
        assert_eq!(
            parse("zoom fine-in"),
            Some(ScriptStep::Edit(EditCommand::Scale {
                factor: 1.0 + cfg.fine_scale_step
            }))
        );
        assert_eq!(
            parse("rotate cw"),
            Some(ScriptStep::Edit(EditCommand::Rotate {
                degrees: -cfg.rotate_step
            }))
        );
    }

    #[test]
    fn test_perspective_and_corners() {
        assert_eq!(parse("persp on"), Some(ScriptStep::Perspective(true)));
        assert_eq!(
            parse("persp"),
            Some(ScriptStep::Edit(EditCommand::TogglePerspective))
        );
        assert_eq!(
            parse("corner 2"),
            Some(ScriptStep::Edit(EditCommand::SelectCorner(2)))
        );
        assert_eq!(
            parse("nudge 1 0"),
            Some(ScriptStep::Edit(EditCommand::NudgeCorner { dx: 1.0, dy: 0.0 }))
        );
    }

    #[test]
    fn test_errors() {
        let cfg = EditingConfig::default();
        assert!(parse_line("move 1", &cfg).is_err());
        assert!(parse_line("rotate x", &cfg).is_err());
        assert!(parse_line("persp maybe", &cfg).is_err());
        assert!(parse_line("jump", &cfg).is_err());
    }
}
