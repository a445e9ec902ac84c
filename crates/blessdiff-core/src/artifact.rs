//! Diagnostic artifacts for failing comparisons.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::discovery::ImageSet;
use crate::error::{BlessError, Result};
use crate::name::{ImageName, PNG_EXTENSION};
use crate::outcome::{ComparisonOutcome, NamedOutcome};

pub const BLESSED_SUFFIX: &str = "_Blessed";
pub const CURRENT_SUFFIX: &str = "_Current";

/// Suffix of the per-image subdirectory used when flat names would collide.
pub const NESTED_DIR_SUFFIX: &str = "_artifacts";

/// Paths written for one failing image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSet {
    /// Composite difference visualisation, `<name>.png`.
    pub diff: Option<PathBuf>,
    /// Copy of the blessed image, `<name>_Blessed.png`.
    pub reference: PathBuf,
    /// Copy of the current image, `<name>_Current.png`.
    pub candidate: PathBuf,
}

/// A failing image whose artifacts could not be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFailure {
    pub name: ImageName,
    pub reason: String,
}

impl ArtifactFailure {
    pub fn to_warning(&self) -> BlessError {
        BlessError::ArtifactPersist {
            name: self.name.clone(),
            reason: self.reason.clone(),
        }
    }
}

/// Owns the diff-output directory.
///
/// Artifacts normally sit flat in the directory. Names whose flat files
/// would overwrite each other (`x` and `x_Blessed`, or names differing only
/// in case) each get their own `<name>_artifacts/` subdirectory instead.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    dir: PathBuf,
    nested: Arc<BTreeMap<ImageName, PathBuf>>,
}

impl ArtifactWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            nested: Arc::default(),
        }
    }

    /// Plan the layout for the names this run may persist.
    pub fn with_names(mut self, names: &[ImageName]) -> Self {
        let mut taken = BTreeSet::new();
        let mut nested = BTreeMap::new();
        for name in clashing_names(names) {
            let base = format!("{name}{NESTED_DIR_SUFFIX}");
            let mut dir_name = base.clone();
            let mut n = 2;
            while !taken.insert(dir_name.to_lowercase()) {
                dir_name = format!("{base}_{n}");
                n += 1;
            }
            warn!(name = %name, dir = %dir_name, "artifact file names clash; using a subdirectory");
            nested.insert(name, self.dir.join(dir_name));
        }
        self.nested = Arc::new(nested);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Directory that receives the artifacts of `name`.
    pub fn target_dir(&self, name: &ImageName) -> &Path {
        self.nested.get(name).map_or(self.dir.as_path(), PathBuf::as_path)
    }

    /// Remove anything left by a previous run and recreate the directory.
    pub fn prepare(&self) -> Result<()> {
        if self.dir.exists() {
            std::fs::remove_dir_all(&self.dir)?;
        }
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Copy the three diagnostic images for `name` into its target directory.
    ///
    /// A missing composite is tolerated (some external tools only report a
    /// score); the two inputs are always copied.
    pub fn persist(
        &self,
        name: &ImageName,
        reference: &Path,
        candidate: &Path,
        diff: &Path,
    ) -> Result<ArtifactSet> {
        let dir = self.target_dir(name);
        if dir != self.dir.as_path() {
            std::fs::create_dir_all(dir)?;
        }
        let reference_out = name.suffixed_png_in(dir, BLESSED_SUFFIX);
        let candidate_out = name.suffixed_png_in(dir, CURRENT_SUFFIX);
        let diff_out = name.png_in(dir);

        std::fs::copy(reference, &reference_out)?;
        std::fs::copy(candidate, &candidate_out)?;

        let diff = if diff.exists() {
            std::fs::copy(diff, &diff_out)?;
            Some(diff_out)
        } else {
            warn!(name = %name, "diff primitive left no composite image");
            None
        };

        Ok(ArtifactSet {
            diff,
            reference: reference_out,
            candidate: candidate_out,
        })
    }
}

/// Names whose flat artifact files collide with another name's, compared
/// case-insensitively.
fn clashing_names(names: &[ImageName]) -> BTreeSet<ImageName> {
    let mut owners: BTreeMap<String, BTreeSet<&ImageName>> = BTreeMap::new();
    for name in names {
        for suffix in ["", BLESSED_SUFFIX, CURRENT_SUFFIX] {
            let file = format!("{name}{suffix}.{PNG_EXTENSION}").to_lowercase();
            owners.entry(file).or_default().insert(name);
        }
    }
    owners
        .into_values()
        .filter(|owners| owners.len() > 1)
        .flatten()
        .cloned()
        .collect()
}

/// Current names with no blessed counterpart, as `WarnMissingBlessed`
/// entries. Blessed-only names are not reported.
///
/// Ordinals continue after `first_ordinal` in name order.
pub fn missing_in_blessed(
    current: &[ImageName],
    blessed: &ImageSet,
    first_ordinal: usize,
) -> Vec<NamedOutcome> {
    current
        .iter()
        .filter(|name| !blessed.contains_key(*name))
        .enumerate()
        .map(|(i, name)| {
            NamedOutcome::new(
                name.clone(),
                first_ordinal + i,
                ComparisonOutcome::WarnMissingBlessed,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn names(list: &[&str]) -> Vec<ImageName> {
        list.iter().map(|n| ImageName::from(*n)).collect()
    }

    fn inputs(tmp: &Path) -> (PathBuf, PathBuf, PathBuf) {
        let blessed = tmp.join("b.png");
        let current = tmp.join("c.png");
        let diff = tmp.join("d.png");
        std::fs::write(&blessed, b"blessed").unwrap();
        std::fs::write(&current, b"current").unwrap();
        std::fs::write(&diff, b"diff").unwrap();
        (blessed, current, diff)
    }

    #[test]
    fn test_prepare_clears_stale_artifacts() {
        let tmp = TempDir::new().unwrap();
        let writer = ArtifactWriter::new(tmp.path().join("diff"));
        writer.prepare().unwrap();
        std::fs::write(writer.dir().join("old.png"), b"stale").unwrap();

        writer.prepare().unwrap();
        assert!(writer.dir().is_dir());
        assert_eq!(std::fs::read_dir(writer.dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_persist_writes_three_named_files() {
        let tmp = TempDir::new().unwrap();
        let (blessed, current, diff) = inputs(tmp.path());

        let writer = ArtifactWriter::new(tmp.path().join("out"));
        writer.prepare().unwrap();
        let set = writer
            .persist(&ImageName::new("slider"), &blessed, &current, &diff)
            .unwrap();

        assert_eq!(set.diff, Some(writer.dir().join("slider.png")));
        assert_eq!(std::fs::read(&set.reference).unwrap(), b"blessed");
        assert_eq!(std::fs::read(&set.candidate).unwrap(), b"current");
        assert!(writer.dir().join("slider_Blessed.png").exists());
        assert!(writer.dir().join("slider_Current.png").exists());
    }

    #[test]
    fn test_persist_without_composite() {
        let tmp = TempDir::new().unwrap();
        let blessed = tmp.path().join("b.png");
        let current = tmp.path().join("c.png");
        std::fs::write(&blessed, b"b").unwrap();
        std::fs::write(&current, b"c").unwrap();

        let writer = ArtifactWriter::new(tmp.path().join("out"));
        writer.prepare().unwrap();
        let set = writer
            .persist(&"x".into(), &blessed, &current, &tmp.path().join("none.png"))
            .unwrap();
        assert!(set.diff.is_none());
        assert!(set.reference.exists());
    }

    #[test]
    fn test_clashing_names_detected() {
        let clash = clashing_names(&names(&["X", "X_Blessed", "menu", "Logo", "logo"]));
        let clash: Vec<_> = clash.iter().map(|n| n.as_str()).collect();
        assert_eq!(clash, vec!["Logo", "X", "X_Blessed", "logo"]);

        assert!(clashing_names(&names(&["a", "b", "a_Blessedx"])).is_empty());
    }

    #[test]
    fn test_clashing_names_get_separate_directories() {
        let tmp = TempDir::new().unwrap();
        let (blessed, current, diff) = inputs(tmp.path());
        let writer = ArtifactWriter::new(tmp.path().join("out"))
            .with_names(&names(&["X", "X_Blessed", "plain"]));
        writer.prepare().unwrap();

        let x = writer.persist(&"X".into(), &blessed, &current, &diff).unwrap();
        std::fs::write(&diff, b"other diff").unwrap();
        let xb = writer
            .persist(&"X_Blessed".into(), &blessed, &current, &diff)
            .unwrap();
        let plain = writer.persist(&"plain".into(), &blessed, &current, &diff).unwrap();

        assert_eq!(x.reference, writer.dir().join("X_artifacts/X_Blessed.png"));
        assert_eq!(
            xb.diff,
            Some(writer.dir().join("X_Blessed_artifacts/X_Blessed.png"))
        );
        assert_eq!(std::fs::read(&x.reference).unwrap(), b"blessed");
        assert_eq!(std::fs::read(xb.diff.unwrap()).unwrap(), b"other diff");
        assert_eq!(plain.reference, writer.dir().join("plain_Blessed.png"));
    }

    #[test]
    fn test_case_variant_directories_stay_distinct() {
        let writer = ArtifactWriter::new("/out").with_names(&names(&["Logo", "logo"]));
        let a = writer.target_dir(&"Logo".into()).to_path_buf();
        let b = writer.target_dir(&"logo".into()).to_path_buf();
        assert_eq!(a, PathBuf::from("/out/Logo_artifacts"));
        assert_eq!(b, PathBuf::from("/out/logo_artifacts_2"));
    }

    #[test]
    fn test_missing_in_blessed_is_one_directional() {
        let blessed: ImageSet = ["A", "B"]
            .into_iter()
            .map(|n| (ImageName::from(n), PathBuf::from(format!("/b/{n}.png"))))
            .collect();
        let current = vec![ImageName::new("A"), ImageName::new("C")];

        let warnings = missing_in_blessed(&current, &blessed, 10);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].name.as_str(), "C");
        assert_eq!(warnings[0].ordinal, 10);
        assert_eq!(warnings[0].outcome, ComparisonOutcome::WarnMissingBlessed);
    }

    #[test]
    fn test_artifact_failure_warning_text() {
        let failure = ArtifactFailure {
            name: "chart".into(),
            reason: "disk full".to_string(),
        };
        assert_eq!(
            failure.to_warning().to_string(),
            "chart: artifacts not written: disk full"
        );
    }
}
