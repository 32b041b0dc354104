//! Shared master slot implementations

use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::{Error, Result};

/// Shared key-value slot holding the current master tab id
///
/// Every tab of one installation sees the same slot. Writes simply overwrite;
/// there is no compare-and-swap, the election protocol tolerates brief races.
pub trait ClaimSlot: Send + Sync + 'static {
    fn read(&self) -> Result<Option<Uuid>>;

    fn write(&self, tab_id: Uuid) -> Result<()>;

    /// Clear the slot only if it still holds `tab_id`
    fn clear_if(&self, tab_id: Uuid) -> Result<()>;
}

/// In-process slot
#[derive(Debug, Default)]
pub struct MemorySlot {
    holder: Mutex<Option<Uuid>>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<Uuid>>> {
        self.holder
            .lock()
            .map_err(|_| Error::Internal("master slot lock poisoned".to_string()))
    }
}

impl ClaimSlot for MemorySlot {
    fn read(&self) -> Result<Option<Uuid>> {
        Ok(*self.lock()?)
    }

    fn write(&self, tab_id: Uuid) -> Result<()> {
        *self.lock()? = Some(tab_id);
        Ok(())
    }

    fn clear_if(&self, tab_id: Uuid) -> Result<()> {
        let mut holder = self.lock()?;
        if *holder == Some(tab_id) {
            *holder = None;
        }
        Ok(())
    }
}

/// Slot stored as a file in the root folder, shared by every process on the host
#[derive(Debug, Clone)]
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl ClaimSlot for FileSlot {
    fn read(&self) -> Result<Option<Uuid>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        match Uuid::parse_str(trimmed) {
            Ok(id) => Ok(Some(id)),
            Err(e) => {
                warn!("Ignoring unreadable master slot {}: {}", self.path.display(), e);
                Ok(None)
            }
        }
    }

    fn write(&self, tab_id: Uuid) -> Result<()> {
        // Write-then-rename so readers never observe a half-written id
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, tab_id.to_string())?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear_if(&self, tab_id: Uuid) -> Result<()> {
        if self.read()? == Some(tab_id) {
            match std::fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
