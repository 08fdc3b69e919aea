//! Persistent record of the client that owns the session

use pulsegate_shared::SessionState;
use std::io;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// File name of the owner record inside the state directory
pub const OWNER_FILE: &str = "client.txt";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to persist session owner to {path}: {source}")]
    Persist { path: PathBuf, source: io::Error },

    #[error("failed to remove session owner record {path}: {source}")]
    Remove { path: PathBuf, source: io::Error },
}

/// Holds the current session owner and mirrors it to disk.
///
/// Every `set`/`clear` writes the record while holding the write guard, so the
/// in-memory value and the file never disagree from a reader's point of view.
pub struct SessionStore {
    owner: RwLock<Option<IpAddr>>,
    /// Where the owner record lives; `None` keeps state in memory only
    path: Option<PathBuf>,
}

impl SessionStore {
    /// Store without persistence
    pub fn in_memory() -> Self {
        Self {
            owner: RwLock::new(None),
            path: None,
        }
    }

    /// Open the store backed by `state_dir/client.txt`, restoring any owner
    /// recorded by a previous run
    pub async fn open(state_dir: impl AsRef<Path>) -> Self {
        let path = state_dir.as_ref().join(OWNER_FILE);
        let owner = restore(&path).await;
        if let Some(addr) = owner {
            info!("Re-opening client session: {}", addr);
        }

        Self {
            owner: RwLock::new(owner),
            path: Some(path),
        }
    }

    /// Current owner, if any
    pub async fn get(&self) -> Option<IpAddr> {
        *self.owner.read().await
    }

    /// Current owner as a state machine state
    pub async fn state(&self) -> SessionState {
        SessionState::from_owner(self.get().await)
    }

    /// Record `addr` as the owner
    pub async fn set(&self, addr: IpAddr) -> Result<(), StoreError> {
        let mut owner = self.owner.write().await;
        if let Some(path) = &self.path {
            persist(path, addr).await?;
        }
        *owner = Some(addr);
        Ok(())
    }

    /// Forget the owner and remove the record
    pub async fn clear(&self) -> Result<(), StoreError> {
        let mut owner = self.owner.write().await;
        if let Some(path) = &self.path {
            match fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(StoreError::Remove {
                        path: path.clone(),
                        source,
                    })
                }
            }
        }
        *owner = None;
        Ok(())
    }
}

async fn restore(path: &Path) -> Option<IpAddr> {
    let contents = match fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("Could not read session record {}: {}", path.display(), e);
            return None;
        }
    };

    match contents.trim().parse::<IpAddr>() {
        Ok(addr) => Some(addr),
        Err(e) => {
            warn!(
                "Discarding unparsable session record {} ({:?}): {}",
                path.display(),
                contents.trim(),
                e
            );
            if let Err(e) = fs::remove_file(path).await {
                warn!("Could not remove session record {}: {}", path.display(), e);
            }
            None
        }
    }
}

async fn persist(path: &Path, addr: IpAddr) -> Result<(), StoreError> {
    write_record(path, addr)
        .await
        .map_err(|source| StoreError::Persist {
            path: path.to_path_buf(),
            source,
        })
}

/// Written to a temporary file, then renamed over the record
async fn write_record(path: &Path, addr: IpAddr) -> io::Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, format!("{addr}\n")).await?;
    fs::rename(&tmp, path).await
}
