pub mod config;
pub mod crop;
pub mod edit;
pub mod info;
pub mod preview;
pub mod save;
pub mod score;

use std::path::Path;

use aligner_core::project::ProjectConfig;
use aligner_core::session::EditingSession;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

/// Load a project file and open an editing session on it.
pub fn open_project(path: &Path) -> Result<(ProjectConfig, EditingSession)> {
    let project = ProjectConfig::load(path)
        .with_context(|| format!("Failed to load project {}", path.display()))?;
    let session = EditingSession::from_project(&project)
        .with_context(|| format!("Failed to open session for {}", path.display()))?;
    debug!(images = session.files().len(), "Project opened");
    Ok((project, session))
}

/// Select image `index`, rejecting indices past the source list.
pub fn select_image(session: &mut EditingSession, index: usize) -> Result<()> {
    let count = session.files().len();
    anyhow::ensure!(
        index < count,
        "image index {index} out of range ({count} source images)"
    );
    session.set_current(index);
    Ok(())
}

pub fn progress_bar(len: usize, message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg:16} [{bar:40}] {pos}/{len}")?
            .progress_chars("=> "),
    );
    pb.set_message(message.to_string());
    Ok(pb)
}

/// Parse `"a,b,..."` into exactly `N` numbers.
pub fn parse_list<const N: usize>(s: &str) -> Result<[f64; N]> {
    let values: Vec<f64> = s
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .with_context(|| format!("Invalid number list '{s}'"))?;
    values
        .try_into()
        .map_err(|v: Vec<f64>| anyhow::anyhow!("Expected {N} values, got {}", v.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list::<2>("3, -4.5").unwrap(), [3.0, -4.5]);
        assert_eq!(parse_list::<4>("1,2,3,4").unwrap(), [1.0, 2.0, 3.0, 4.0]);
        assert!(parse_list::<4>("1,2,3").is_err());
        assert!(parse_list::<2>("1,x").is_err());
    }
}
