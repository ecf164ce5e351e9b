//! Persistence of the survey record.
//!
//! [`StatusStore`] is the single owner of the record. Every read-modify-write
//! goes through [`StatusStore::update`], which holds one lock across load,
//! mutation and save so concurrent acknowledgements cannot overwrite each
//! other's `responses` entries.

use crate::error::{PingbackError, Result};
use crate::survey::state::SurveyState;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, warn};

/// Load/save capability behind the store.
pub trait StateBackend: Send {
    /// Read the record. `Ok(None)` when nothing has been persisted yet.
    fn read(&self) -> Result<Option<SurveyState>>;

    /// Replace the record.
    fn write(&mut self, state: &SurveyState) -> Result<()>;

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

/// Pretty-printed JSON file, replaced atomically on every write.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateBackend for JsonFileBackend {
    fn read(&self) -> Result<Option<SurveyState>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(PingbackError::Store(format!(
                    "cannot read {}: {e}",
                    self.path.display()
                )));
            }
        };

        serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            PingbackError::Store(format!("cannot parse {}: {e}", self.path.display()))
        })
    }

    fn write(&mut self, state: &SurveyState) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| PingbackError::Store(format!("cannot create state dir: {e}")))?;
        }

        let json = serde_json::to_string_pretty(state)
            .map_err(|e| PingbackError::Store(format!("cannot serialize state: {e}")))?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)
            .map_err(|e| PingbackError::Store(format!("cannot write state tmp: {e}")))?;
        std::fs::rename(&tmp_path, &self.path)
            .map_err(|e| PingbackError::Store(format!("cannot replace state: {e}")))?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-process record for tests and throwaway deployments.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Option<SurveyState>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing record.
    pub fn with_state(state: SurveyState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    /// Switch that makes every subsequent write fail while set.
    pub fn write_failure_switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.fail_writes)
    }
}

impl StateBackend for MemoryBackend {
    fn read(&self) -> Result<Option<SurveyState>> {
        Ok(self.state.clone())
    }

    fn write(&mut self, state: &SurveyState) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PingbackError::Store("simulated write failure".to_owned()));
        }
        self.state = Some(state.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_owned()
    }
}

/// Mutex-guarded owner of the survey record.
pub struct StatusStore {
    backend: Mutex<Box<dyn StateBackend>>,
}

impl std::fmt::Debug for StatusStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusStore").finish_non_exhaustive()
    }
}

impl StatusStore {
    pub fn new(backend: impl StateBackend + 'static) -> Self {
        Self {
            backend: Mutex::new(Box::new(backend)),
        }
    }

    /// Store backed by a JSON file at `path`.
    pub fn json_file(path: impl Into<PathBuf>) -> Self {
        Self::new(JsonFileBackend::new(path))
    }

    /// Store backed by process memory.
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// Current record, or the empty default when it is missing or unreadable.
    pub fn load(&self) -> SurveyState {
        let backend = self.lock_recovering();
        read_or_default(&**backend)
    }

    /// Replace the record.
    ///
    /// # Errors
    ///
    /// Returns [`PingbackError::Store`] when the backend cannot persist it.
    pub fn save(&self, state: &SurveyState) -> Result<()> {
        let mut backend = self.lock()?;
        write_logged(&mut **backend, state)
    }

    /// Load, mutate and save under one lock.
    ///
    /// The mutation is discarded when the save fails.
    ///
    /// # Errors
    ///
    /// Returns [`PingbackError::Store`] when the backend cannot persist the result.
    pub fn update<T>(&self, mutate: impl FnOnce(&mut SurveyState) -> T) -> Result<T> {
        let mut backend = self.lock()?;
        let mut state = read_or_default(&**backend);
        let out = mutate(&mut state);
        write_logged(&mut **backend, &state)?;
        Ok(out)
    }

    /// Replace the record with the empty default.
    ///
    /// # Errors
    ///
    /// Returns [`PingbackError::Store`] when the backend cannot persist it.
    pub fn reset(&self) -> Result<()> {
        self.save(&SurveyState::default())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Box<dyn StateBackend>>> {
        self.backend
            .lock()
            .map_err(|_| PingbackError::Store("status store lock poisoned".to_owned()))
    }

    fn lock_recovering(&self) -> MutexGuard<'_, Box<dyn StateBackend>> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn read_or_default(backend: &dyn StateBackend) -> SurveyState {
    match backend.read() {
        Ok(Some(state)) => state,
        Ok(None) => SurveyState::default(),
        Err(e) => {
            warn!(store = %backend.describe(), "status record unreadable, using empty state: {e}");
            SurveyState::default()
        }
    }
}

fn write_logged(backend: &mut dyn StateBackend, state: &SurveyState) -> Result<()> {
    match backend.write(state) {
        Ok(()) => {
            debug!(
                store = %backend.describe(),
                responses = state.responses.len(),
                first_sent = state.first_sent,
                answered = state.answered,
                "status record saved"
            );
            Ok(())
        }
        Err(e) => {
            error!(store = %backend.describe(), "cannot persist status record: {e}");
            Err(e)
        }
    }
}
