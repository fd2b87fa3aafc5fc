//! JSON state file
//!
//! The background store keeps its state in memory and mirrors every change
//! to one JSON file. The file carries a schema number and an md5 checksum of
//! the state. A file that fails either check is moved aside and the store
//! starts over from defaults, so a damaged file never keeps the extension
//! from filtering.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

/// Persistence errors
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Reading or writing the state file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// State could not be encoded or the file could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// State was used before [`PersistedState::init`]
    #[error("State not initialized")]
    NotInitialized,

    /// Stored checksum does not match the stored state
    #[error("Checksum mismatch: stored {stored}, computed {computed}")]
    Corruption {
        /// Checksum in the file
        stored: String,
        /// Checksum of the decoded state
        computed: String,
    },

    /// File was written under another schema
    #[error("Schema mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Schema this build reads
        expected: u32,
        /// Schema in the file
        found: u32,
    },
}

/// Result type for persistence operations
pub type Result<T> = std::result::Result<T, PersistenceError>;

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    schema: u32,
    checksum: String,
    state: T,
}

fn digest<T: Serialize>(state: &T) -> Result<String> {
    Ok(format!("{:x}", md5::compute(serde_json::to_vec(state)?)))
}

/// Where and how state is stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceConfig {
    /// State file
    pub path: PathBuf,
    /// Schema number written to and expected in the file
    pub schema_version: u32,
    /// Write to a sibling temp file and rename it into place
    pub atomic_writes: bool,
}

impl PersistenceConfig {
    /// Store state at `path` with schema 1 and atomic writes
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            schema_version: 1,
            atomic_writes: true,
        }
    }

    /// Set the schema number
    pub fn with_schema_version(mut self, schema_version: u32) -> Self {
        self.schema_version = schema_version;
        self
    }

    /// Enable or disable atomic writes
    pub fn with_atomic_writes(mut self, enabled: bool) -> Self {
        self.atomic_writes = enabled;
        self
    }

    /// Where an unreadable state file is moved
    pub fn backup_path(&self) -> PathBuf {
        sibling(&self.path, "bak")
    }

    fn temp_path(&self) -> PathBuf {
        sibling(&self.path, "tmp")
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// How [`PersistedState::init`] obtained its state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No state file existed
    Fresh,
    /// State was read from the file
    Loaded,
    /// The file failed its checks and was moved to the backup path
    Recovered,
}

/// In-memory state mirrored to a JSON file
pub struct PersistedState<T> {
    config: PersistenceConfig,
    state: RwLock<Option<T>>,
}

impl<T> PersistedState<T>
where
    T: Serialize + DeserializeOwned + Clone + Default,
{
    /// Create an uninitialized state
    pub fn new(config: PersistenceConfig) -> Self {
        Self {
            config,
            state: RwLock::new(None),
        }
    }

    /// State file
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Load the state file
    ///
    /// A missing file starts from defaults. A file with a bad checksum or
    /// another schema is moved to [`PersistenceConfig::backup_path`] and the
    /// state starts from defaults. IO failures are returned.
    pub async fn init(&self) -> Result<LoadOutcome> {
        let (state, outcome) = match self.read_file().await {
            Ok(state) => (state, LoadOutcome::Loaded),
            Err(PersistenceError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                (T::default(), LoadOutcome::Fresh)
            }
            Err(
                e @ (PersistenceError::Corruption { .. }
                | PersistenceError::VersionMismatch { .. }
                | PersistenceError::Serialization(_)),
            ) => {
                let backup = self.config.backup_path();
                tracing::warn!(
                    "Discarding state file {} ({}), moved to {}",
                    self.config.path.display(),
                    e,
                    backup.display()
                );
                fs::rename(&self.config.path, &backup).await?;
                (T::default(), LoadOutcome::Recovered)
            }
            Err(e) => return Err(e),
        };

        *self.state.write().await = Some(state);
        Ok(outcome)
    }

    /// Copy of the current state
    pub async fn get(&self) -> Result<T> {
        self.state.read().await.clone().ok_or(PersistenceError::NotInitialized)
    }

    /// Change the state, write it out and return what `f` returned
    ///
    /// The in-memory change stands even if the write fails.
    pub async fn update<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut T) -> R,
    {
        let mut guard = self.state.write().await;
        let state = guard.as_mut().ok_or(PersistenceError::NotInitialized)?;

        let output = f(state);
        self.write_file(state).await?;
        Ok(output)
    }

    /// Replace the state and write it out
    pub async fn set(&self, state: T) -> Result<()> {
        let mut guard = self.state.write().await;
        self.write_file(&state).await?;
        *guard = Some(state);
        Ok(())
    }

    /// Reset to defaults and delete the state file
    pub async fn clear(&self) -> Result<()> {
        let mut guard = self.state.write().await;
        match fs::remove_file(&self.config.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        *guard = Some(T::default());
        Ok(())
    }

    async fn read_file(&self) -> Result<T> {
        let bytes = fs::read(&self.config.path).await?;
        let envelope: Envelope<T> = serde_json::from_slice(&bytes)?;

        if envelope.schema != self.config.schema_version {
            return Err(PersistenceError::VersionMismatch {
                expected: self.config.schema_version,
                found: envelope.schema,
            });
        }

        let computed = digest(&envelope.state)?;
        if computed != envelope.checksum {
            return Err(PersistenceError::Corruption {
                stored: envelope.checksum,
                computed,
            });
        }

        Ok(envelope.state)
    }

    async fn write_file(&self, state: &T) -> Result<()> {
        let envelope = Envelope {
            schema: self.config.schema_version,
            checksum: digest(state)?,
            state,
        };
        let json = serde_json::to_vec_pretty(&envelope)?;

        if !self.config.atomic_writes {
            fs::write(&self.config.path, json).await?;
            return Ok(());
        }

        let temp = self.config.temp_path();
        let mut file = fs::File::create(&temp).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp, &self.config.path).await?;
        Ok(())
    }
}
