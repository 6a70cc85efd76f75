//! Output locations for saved figures.

use crate::config::{Config, FigureFormat};
use crate::error::Result;
use std::fmt;
use std::path::{Path, PathBuf};

/// Directory a figure is filed under inside a run's output folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Raw,
    Psd,
    Sensors,
    Epochs,
    Topomap,
}

impl ArtifactKind {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Psd => "psd",
            Self::Sensors => "sensors",
            Self::Epochs => "epochs",
            Self::Topomap => "topomap",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Directory for `artifact` figures of one (subject, run), created on demand.
///
/// Returns `Ok(None)` whenever saving is disabled, whatever the other
/// arguments are. Creating an existing directory is not an error.
pub fn save_path(
    config: &Config,
    subject: &str,
    run: &str,
    artifact: ArtifactKind,
) -> Result<Option<PathBuf>> {
    if !config.save_figures.enabled {
        return Ok(None);
    }

    let dir = config
        .output
        .base_directory
        .join(format!("sub-{}", subject))
        .join(format!("run-{}", run))
        .join(artifact.dir_name());

    std::fs::create_dir_all(&dir)?;
    Ok(Some(dir))
}

/// `{dir}/{name}.{ext}`
pub fn figure_file(dir: &Path, name: &str, format: FigureFormat) -> PathBuf {
    dir.join(format!("{}.{}", name, format.extension()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(base: &Path) -> Config {
        let mut cfg = Config::new("/data", "mi");
        cfg.output.base_directory = base.to_path_buf();
        cfg
    }

    #[test]
    fn test_save_path_layout_and_creation() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config_in(tmp.path());
        let dir = save_path(&cfg, "01", "02", ArtifactKind::Topomap).unwrap().unwrap();
        assert_eq!(dir, tmp.path().join("sub-01").join("run-02").join("topomap"));
        assert!(dir.is_dir());
    }

    #[test]
    fn test_save_path_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config_in(tmp.path());
        let first = save_path(&cfg, "01", "01", ArtifactKind::Raw).unwrap();
        let second = save_path(&cfg, "01", "01", ArtifactKind::Raw).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_disabled_saving_returns_none_and_creates_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = config_in(&tmp.path().join("out"));
        cfg.save_figures.enabled = false;
        for artifact in [ArtifactKind::Raw, ArtifactKind::Psd, ArtifactKind::Sensors] {
            assert_eq!(save_path(&cfg, "01", "01", artifact).unwrap(), None);
            assert_eq!(save_path(&cfg, "", "x", artifact).unwrap(), None);
        }
        assert!(!tmp.path().join("out").exists());
    }

    #[test]
    fn test_figure_file_uses_format_extension() {
        let p = figure_file(Path::new("/out"), "topomap_left", FigureFormat::Svg);
        assert_eq!(p, PathBuf::from("/out/topomap_left.svg"));
    }
}
