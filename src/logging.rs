use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::app_dirs::AppDirs;

/// Route `tracing` output to a log file. The terminal belongs to the TUI,
/// so when no file can be opened logging is dropped instead.
///
/// An explicit path is tried first, then the default state-dir location.
pub fn init_tracing(explicit: Option<&Path>) -> Option<PathBuf> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let mut candidates: Vec<PathBuf> = explicit.map(Path::to_path_buf).into_iter().collect();
    if let Some(default) = AppDirs::log_path() {
        if !candidates.contains(&default) {
            candidates.push(default);
        }
    }

    let (opened, warnings) = open_first(candidates);
    let Some((path, file)) = opened else {
        let _ = tracing_subscriber::registry().with(env_filter).try_init();
        return None;
    };

    let installed = tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .with(env_filter)
        .try_init()
        .is_ok();
    if installed {
        tracing::info!(path = %path.display(), "logging initialized");
        for warning in warnings {
            tracing::warn!("{warning}");
        }
    }
    Some(path)
}

/// Open the first usable candidate, collecting a warning for each one skipped
fn open_first(candidates: Vec<PathBuf>) -> (Option<(PathBuf, File)>, Vec<String>) {
    let mut warnings = Vec::new();
    for candidate in candidates {
        match open_log_file(&candidate) {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => warnings.push(format!(
                "failed to open log file {}: {e}",
                candidate.display()
            )),
        }
    }
    (None, warnings)
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_log_file_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("reactnow.log");
        open_log_file(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn open_first_falls_back_past_unusable_paths() {
        let dir = tempdir().unwrap();
        // a regular file cannot serve as a parent directory
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"").unwrap();
        let bad = blocker.join("reactnow.log");
        let good = dir.path().join("state").join("reactnow.log");

        let (opened, warnings) = open_first(vec![bad.clone(), good.clone()]);

        assert_eq!(opened.map(|(path, _)| path), Some(good));
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains(&bad.display().to_string()));
    }

    #[test]
    fn open_first_with_nothing_usable() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"").unwrap();

        let (opened, warnings) = open_first(vec![blocker.join("a.log"), blocker.join("b.log")]);
        assert!(opened.is_none());
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn init_tracing_reports_explicit_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("explicit.log");
        assert_eq!(init_tracing(Some(&path)), Some(path.clone()));
        assert!(path.exists());
    }
}
