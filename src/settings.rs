//! Persisted primary key name.
//!
//! A single UTF-8 text file under the per-user data directory holds the file name the user
//! marked as primary. A missing file means no primary is set.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Result, WatchError};

const APP_DIR: &str = "KeyFileMonitor";
const FILE_NAME: &str = "primary.txt";

#[derive(Debug, Clone)]
pub struct PrimaryKeyStore {
    path: PathBuf,
}

impl PrimaryKeyStore {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store in the platform data directory, or beside the executable's working directory
    /// when the platform reports none.
    pub fn default_location() -> Self {
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::at(base.join(APP_DIR).join(FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(value) => {
                let value = value.trim().to_string();
                debug!(path = %self.path.display(), %value, "primary key loaded");
                Ok((!value.is_empty()).then_some(value))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(self.error(source)),
        }
    }

    /// Persist `name`, creating the parent directory when needed.
    pub fn save(&self, name: &str) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| self.error(e))?;
        }
        fs::write(&self.path, name).map_err(|e| self.error(e))?;
        info!(path = %self.path.display(), name, "primary key saved");
        Ok(())
    }

    fn error(&self, source: io::Error) -> WatchError {
        WatchError::Settings {
            path: self.path.clone(),
            source,
        }
    }
}
