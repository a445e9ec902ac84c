//! Input discovery and boundary preconditions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::RunConfig;
use crate::error::{BlessError, Result};
use crate::name::ImageName;

/// PNG files of one directory, keyed by name, with the path as found on disk.
pub type ImageSet = BTreeMap<ImageName, PathBuf>;

/// One name to compare and the two files it resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePair {
    pub name: ImageName,
    pub blessed: PathBuf,
    pub current: PathBuf,
}

impl ImagePair {
    /// Pair `<name>.png` in each directory.
    pub fn in_dirs(name: ImageName, blessed_dir: &Path, current_dir: &Path) -> Self {
        Self {
            blessed: name.png_in(blessed_dir),
            current: name.png_in(current_dir),
            name,
        }
    }
}

/// The two image sets of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputSets {
    pub blessed: ImageSet,
    pub current: ImageSet,
}

impl InputSets {
    /// Names to compare: the current set, narrowed by `prefix`, in name order.
    pub fn names_to_test(&self, prefix: Option<&str>) -> Vec<ImageName> {
        self.current
            .keys()
            .filter(|name| prefix.map_or(true, |p| name.starts_with(p)))
            .cloned()
            .collect()
    }

    /// Pairs for [`names_to_test`](Self::names_to_test), using the file names
    /// found on disk. A name absent from the blessed set points at
    /// `<name>.png` in `blessed_dir`, which the comparator reports as missing.
    pub fn pairs_to_test(&self, prefix: Option<&str>, blessed_dir: &Path) -> Vec<ImagePair> {
        self.current
            .iter()
            .filter(|(name, _)| prefix.map_or(true, |p| name.starts_with(p)))
            .map(|(name, current)| ImagePair {
                name: name.clone(),
                blessed: self
                    .blessed
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| name.png_in(blessed_dir)),
                current: current.clone(),
            })
            .collect()
    }
}

/// List the PNG files directly inside `dir`.
///
/// The extension match ignores case. Two files that map to the same name
/// (`logo.png` and `logo.PNG`) are a configuration error.
pub fn list_pngs(dir: &Path) -> Result<ImageSet> {
    let mut images = ImageSet::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = ImageName::from_path(&path) else {
            continue;
        };
        if let Some(previous) = images.get(&name) {
            return Err(BlessError::Configuration(format!(
                "{} and {} both provide image '{name}'",
                previous.display(),
                path.display()
            )));
        }
        images.insert(name, path);
    }
    Ok(images)
}

/// Verify both input directories exist and hold at least one PNG.
///
/// A count mismatch between the sets is logged, not rejected.
pub fn check_inputs(config: &RunConfig) -> Result<InputSets> {
    let blessed = load_set(&config.blessed_dir, "blessed")?;
    let current = load_set(&config.current_dir, "current")?;

    if blessed.len() != current.len() {
        warn!(
            blessed = blessed.len(),
            current = current.len(),
            "blessed and current image counts differ"
        );
    }
    debug!(
        blessed = blessed.len(),
        current = current.len(),
        "discovered input images"
    );

    Ok(InputSets { blessed, current })
}

fn load_set(dir: &Path, label: &str) -> Result<ImageSet> {
    if !dir.is_dir() {
        return Err(BlessError::Configuration(format!(
            "{label} directory {} does not exist",
            dir.display()
        )));
    }
    let images = list_pngs(dir)?;
    if images.is_empty() {
        return Err(BlessError::Configuration(format!(
            "{label} directory {} contains no PNG images",
            dir.display()
        )));
    }
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, file: &str) {
        std::fs::write(dir.join(file), b"").unwrap();
    }

    fn layout() -> (TempDir, RunConfig) {
        let tmp = TempDir::new().unwrap();
        let config = RunConfig::new(tmp.path());
        std::fs::create_dir_all(&config.blessed_dir).unwrap();
        std::fs::create_dir_all(&config.current_dir).unwrap();
        (tmp, config)
    }

    fn set(names: &[&str]) -> ImageSet {
        names
            .iter()
            .map(|n| (ImageName::from(*n), PathBuf::from(format!("/cur/{n}.png"))))
            .collect()
    }

    #[test]
    fn test_list_pngs_ignores_other_entries() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "a.png");
        touch(tmp.path(), "b.png");
        touch(tmp.path(), "notes.txt");
        std::fs::create_dir(tmp.path().join("nested.png")).unwrap();

        let images = list_pngs(tmp.path()).unwrap();
        let names: Vec<_> = images.keys().map(|n| n.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_list_pngs_keeps_on_disk_file_name() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "Logo.PNG");

        let images = list_pngs(tmp.path()).unwrap();
        assert_eq!(images[&ImageName::new("Logo")], tmp.path().join("Logo.PNG"));
    }

    #[test]
    fn test_same_name_with_two_extensions_is_rejected() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "logo.png");
        touch(tmp.path(), "logo.PNG");
        if std::fs::read_dir(tmp.path()).unwrap().count() < 2 {
            // case-insensitive filesystem: only one file exists
            return;
        }

        let err = list_pngs(tmp.path()).unwrap_err();
        assert!(matches!(err, BlessError::Configuration(_)));
        assert!(err.to_string().contains("'logo'"));
    }

    #[test]
    fn test_missing_directory_is_configuration_error() {
        let tmp = TempDir::new().unwrap();
        let config = RunConfig::new(tmp.path());
        let err = check_inputs(&config).unwrap_err();
        assert!(matches!(err, BlessError::Configuration(_)));
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_empty_directory_is_configuration_error() {
        let (_tmp, config) = layout();
        touch(&config.blessed_dir, "a.png");
        let err = check_inputs(&config).unwrap_err();
        assert!(err.to_string().contains("current directory"));
        assert!(err.to_string().contains("no PNG"));
    }

    #[test]
    fn test_count_mismatch_is_accepted() {
        let (_tmp, config) = layout();
        touch(&config.blessed_dir, "a.png");
        touch(&config.current_dir, "a.png");
        touch(&config.current_dir, "b.png");
        let sets = check_inputs(&config).unwrap();
        assert_eq!(sets.blessed.len(), 1);
        assert_eq!(sets.current.len(), 2);
    }

    #[test]
    fn test_names_to_test_applies_prefix() {
        let sets = InputSets {
            blessed: ImageSet::new(),
            current: set(&["chart_bar", "chart_pie", "menu"]),
        };
        assert_eq!(sets.names_to_test(None).len(), 3);
        let filtered = sets.names_to_test(Some("chart_"));
        assert_eq!(
            filtered,
            vec![ImageName::new("chart_bar"), ImageName::new("chart_pie")]
        );
    }

    #[test]
    fn test_pairs_resolve_discovered_paths() {
        let mut blessed = ImageSet::new();
        blessed.insert(ImageName::new("Logo"), PathBuf::from("/bls/Logo.PNG"));
        let sets = InputSets {
            blessed,
            current: [
                (ImageName::new("Logo"), PathBuf::from("/cur/Logo.Png")),
                (ImageName::new("menu"), PathBuf::from("/cur/menu.png")),
            ]
            .into_iter()
            .collect(),
        };

        let pairs = sets.pairs_to_test(None, Path::new("/bls"));
        assert_eq!(
            pairs,
            vec![
                ImagePair {
                    name: ImageName::new("Logo"),
                    blessed: PathBuf::from("/bls/Logo.PNG"),
                    current: PathBuf::from("/cur/Logo.Png"),
                },
                ImagePair {
                    name: ImageName::new("menu"),
                    blessed: PathBuf::from("/bls/menu.png"),
                    current: PathBuf::from("/cur/menu.png"),
                },
            ]
        );
    }
}
