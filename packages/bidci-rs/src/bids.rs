//! BIDS path construction and dataset discovery.

use crate::error::{BidciError, Result};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

pub const EEG_SUFFIX: &str = "eeg";
pub const EDF_EXTENSION: &str = ".edf";

/// Entities identifying one recording inside a BIDS dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BidsPath {
    pub root: PathBuf,
    pub subject: String,
    pub session: Option<String>,
    pub task: String,
    pub run: Option<String>,
    pub suffix: String,
    pub extension: String,
}

impl BidsPath {
    pub fn new(root: impl Into<PathBuf>, subject: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            subject: subject.into(),
            session: None,
            task: task.into(),
            run: None,
            suffix: EEG_SUFFIX.to_string(),
            extension: EDF_EXTENSION.to_string(),
        }
    }

    pub fn with_session(mut self, session: Option<String>) -> Self {
        self.session = session;
        self
    }

    pub fn with_run(mut self, run: Option<String>) -> Self {
        self.run = run;
        self
    }

    /// `sub-01_ses-01_task-rest_run-01_eeg.edf`
    pub fn basename(&self) -> String {
        let mut name = format!("sub-{}", self.subject);
        if let Some(ref ses) = self.session {
            name.push_str(&format!("_ses-{}", ses));
        }
        name.push_str(&format!("_task-{}", self.task));
        if let Some(ref run) = self.run {
            name.push_str(&format!("_run-{}", run));
        }
        name.push_str(&format!("_{}{}", self.suffix, self.extension));
        name
    }

    /// Directory holding the recording: `{root}/sub-X[/ses-Y]/eeg`.
    pub fn directory(&self) -> PathBuf {
        let mut dir = self.root.join(format!("sub-{}", self.subject));
        if let Some(ref ses) = self.session {
            dir = dir.join(format!("ses-{}", ses));
        }
        dir.join(EEG_SUFFIX)
    }

    pub fn fpath(&self) -> PathBuf {
        self.directory().join(self.basename())
    }

    /// Fails with [`BidciError::NotFound`] when the recording is missing.
    pub fn ensure_exists(&self) -> Result<PathBuf> {
        let path = self.fpath();
        if path.is_file() {
            Ok(path)
        } else {
            Err(BidciError::NotFound(path.display().to_string()))
        }
    }
}

impl fmt::Display for BidsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fpath().display())
    }
}

/// A recording found on disk by [`discover`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredRecording {
    pub subject: String,
    pub session: Option<String>,
    pub run: Option<String>,
    pub path: PathBuf,
}

/// List the EDF recordings of `task` under `root`, sorted by path.
pub fn discover(root: &Path, task: &str) -> Result<Vec<DiscoveredRecording>> {
    if !root.is_dir() {
        return Err(BidciError::NotFound(format!(
            "BIDS directory not found: {}",
            root.display()
        )));
    }

    let escaped_root = glob::Pattern::escape(&root.to_string_lossy());
    let patterns = [
        format!("{}/sub-*/eeg/*_task-{}*_eeg{}", escaped_root, task, EDF_EXTENSION),
        format!("{}/sub-*/ses-*/eeg/*_task-{}*_eeg{}", escaped_root, task, EDF_EXTENSION),
    ];

    let mut found = Vec::new();
    for pattern in &patterns {
        let paths = glob::glob(pattern).map_err(|e| {
            BidciError::Precondition(format!("Invalid discovery pattern '{}': {}", pattern, e))
        })?;
        for entry in paths {
            match entry {
                Ok(path) => {
                    if let Some(rec) = parse_entities(&path, task) {
                        found.push(rec);
                    }
                }
                Err(e) => log::warn!("Skipping unreadable path during discovery: {}", e),
            }
        }
    }
    found.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(found)
}

fn parse_entities(path: &Path, task: &str) -> Option<DiscoveredRecording> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(EDF_EXTENSION)?.strip_suffix("_eeg")?;

    let mut subject = None;
    let mut session = None;
    let mut run = None;
    let mut task_matches = false;
    for part in stem.split('_') {
        let (key, value) = part.split_once('-')?;
        match key {
            "sub" => subject = Some(value.to_string()),
            "ses" => session = Some(value.to_string()),
            "task" => task_matches = value == task,
            "run" => run = Some(value.to_string()),
            _ => {}
        }
    }

    if !task_matches {
        return None;
    }
    Some(DiscoveredRecording {
        subject: subject?,
        session,
        run,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_fpath_without_session() {
        let p = BidsPath::new("/data", "01", "motor").with_run(Some("02".into()));
        assert_eq!(
            p.fpath(),
            PathBuf::from("/data/sub-01/eeg/sub-01_task-motor_run-02_eeg.edf")
        );
    }

    #[test]
    fn test_fpath_with_session_and_no_run() {
        let p = BidsPath::new("/data", "01", "rest").with_session(Some("A".into()));
        assert_eq!(
            p.fpath(),
            PathBuf::from("/data/sub-01/ses-A/eeg/sub-01_ses-A_task-rest_eeg.edf")
        );
    }

    #[test]
    fn test_ensure_exists_reports_missing_path() {
        let p = BidsPath::new("/nonexistent_dir_12345", "01", "t");
        let err = p.ensure_exists().unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("sub-01_task-t_eeg.edf"));
    }

    #[test]
    fn test_discover_finds_task_recordings() {
        let tmp = tempfile::tempdir().unwrap();
        for (sub, run) in [("02", "01"), ("01", "02"), ("01", "01")] {
            let p = BidsPath::new(tmp.path(), sub, "mi").with_run(Some(run.into()));
            fs::create_dir_all(p.directory()).unwrap();
            fs::write(p.fpath(), "").unwrap();
        }
        let other = BidsPath::new(tmp.path(), "01", "rest");
        fs::write(other.fpath(), "").unwrap();

        let found = discover(tmp.path(), "mi").unwrap();
        let pairs: Vec<(&str, Option<&str>)> = found
            .iter()
            .map(|r| (r.subject.as_str(), r.run.as_deref()))
            .collect();
        assert_eq!(
            pairs,
            vec![("01", Some("01")), ("01", Some("02")), ("02", Some("01"))]
        );
    }

    #[test]
    fn test_discover_missing_root() {
        assert!(discover(Path::new("/nonexistent_dir_12345"), "mi").is_err());
    }
}
