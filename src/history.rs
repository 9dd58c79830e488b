//! Durable message log, loaded once at server start-up and saved once at shutdown.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::{HISTORY_FILE_NAME, HOME_DIR_NAME};
use crate::datatypes::Message;
use crate::error::{Error, Result};

#[derive(Clone, Debug)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<home>/.chatlink/history`
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("cannot determine the home directory".to_owned()))?;
        Ok(home.join(HOME_DIR_NAME).join(HISTORY_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the parent directory and an empty history file if they are missing.
    pub fn ensure_exists(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                Error::Persistence(format!("cannot create directory {}: {err}", parent.display()))
            })?;
        }

        if !self.path.exists() {
            File::create(&self.path).map_err(|err| {
                Error::Persistence(format!("cannot create history file {}: {err}", self.path.display()))
            })?;
        }
        Ok(())
    }

    /// Reads the saved log. Any problem degrades to an empty history.
    pub fn load(&self) -> Vec<Message> {
        match self.try_load() {
            Ok(messages) => {
                tracing::info!("loaded {} messages from {}", messages.len(), self.path.display());
                messages
            }
            Err(err) => {
                tracing::warn!("cannot retrieve messages from {}: {err}", self.path.display());
                Vec::new()
            }
        }
    }

    fn try_load(&self) -> Result<Vec<Message>> {
        // Decoding from memory keeps a corrupt length prefix from driving allocation.
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        // An empty file is a first run, not a corrupt one.
        if bytes.is_empty() {
            return Ok(Vec::new());
        }

        Ok(bincode::deserialize(&bytes)?)
    }

    /// Rewrites the whole file through a temporary sibling and a rename.
    pub fn save(&self, messages: &[Message]) -> Result<()> {
        let tmp_path = self.tmp_path();

        let write = || -> Result<()> {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            bincode::serialize_into(&mut writer, messages)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            Ok(())
        };

        if let Err(err) = write() {
            let _ = fs::remove_file(&tmp_path);
            return Err(Error::Persistence(format!("cannot save messages to {}: {err}", tmp_path.display())));
        }

        fs::rename(&tmp_path, &self.path).map_err(|err| {
            Error::Persistence(format!("cannot replace {}: {err}", self.path.display()))
        })?;

        tracing::info!("saved {} messages to {}", messages.len(), self.path.display());
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
