//! The on-disk tunnel config.

use std::path::Path;
use supernova_core::Result;
use tempfile::NamedTempFile;

const PREFIX: &str = "supernovad-nebula-";
const SUFFIX: &str = ".conf";

/// Uniquely named config file the tunnel is started against.
///
/// The path stays the same for the daemon's lifetime so a reload signal
/// picks up new content. The file is removed when this value is dropped.
#[derive(Debug)]
pub struct ConfigFile {
    file: NamedTempFile,
}

impl ConfigFile {
    /// Create the file in the system temp directory with `contents`.
    pub fn create(contents: &str) -> Result<Self> {
        let file = tempfile::Builder::new()
            .prefix(PREFIX)
            .suffix(SUFFIX)
            .tempfile()?;
        Self::init(file, contents)
    }

    /// Create the file in `dir` with `contents`.
    pub fn create_in(dir: &Path, contents: &str) -> Result<Self> {
        let file = tempfile::Builder::new()
            .prefix(PREFIX)
            .suffix(SUFFIX)
            .tempfile_in(dir)?;
        Self::init(file, contents)
    }

    fn init(file: NamedTempFile, contents: &str) -> Result<Self> {
        let this = Self { file };
        this.write(contents)?;
        Ok(this)
    }

    /// Path handed to the tunnel
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Replace the contents in place.
    pub fn write(&self, contents: &str) -> Result<()> {
        std::fs::write(self.path(), contents)?;
        Ok(())
    }
}
