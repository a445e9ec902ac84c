//! Image identifiers shared between the blessed and current sets.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Extension every compared image carries.
pub const PNG_EXTENSION: &str = "png";

/// Join key between the blessed and current sets, derived from a file stem.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageName(String);

impl ImageName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Derive a name from a `.png` path. Returns `None` for other extensions.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if !ext.eq_ignore_ascii_case(PNG_EXTENSION) {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        if stem.is_empty() {
            return None;
        }
        Some(Self(stem.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path of this image inside `dir`.
    pub fn png_in(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.{}", self.0, PNG_EXTENSION))
    }

    /// Path of `<name><suffix>.png` inside `dir`.
    pub fn suffixed_png_in(&self, dir: &Path, suffix: &str) -> PathBuf {
        dir.join(format!("{}{}.{}", self.0, suffix, PNG_EXTENSION))
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl std::fmt::Display for ImageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ImageName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
