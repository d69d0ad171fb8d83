//! Periodic snapshots of an entity tree.
//!
//! A snapshot file is the magic `MRDN`, a `u16` format version, then the
//! tree's own encoding (`u32` element count, then per element its octal code
//! and entities). Saves go to a sibling `.tmp` file that is renamed over the
//! previous snapshot.

use crate::codec::CodecError;
use crate::config::PersistConfig;
use crate::shutdown::ShutdownState;
use crate::store::{EntityTree, TreeDecode};
use bytes::{BufMut, Bytes, BytesMut};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

pub const SNAPSHOT_MAGIC: &[u8; 4] = b"MRDN";
pub const SNAPSHOT_VERSION: u16 = 1;
const SNAPSHOT_HEADER_SIZE: usize = 4 + 2;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Not an entity snapshot (bad magic)")]
    BadMagic,

    #[error("Unsupported snapshot version {0}")]
    UnsupportedVersion(u16),

    #[error("Snapshot header unreadable: {0}")]
    Codec(#[from] CodecError),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PersistError + '_ {
    move |source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Serializes `tree` into a complete snapshot.
pub fn encode_snapshot(tree: &EntityTree) -> Bytes {
    let mut out = BytesMut::new();
    out.put_slice(SNAPSHOT_MAGIC);
    out.put_u16(SNAPSHOT_VERSION);
    tree.encode(&mut out);
    out.freeze()
}

/// Merges a snapshot into `tree`. Everything decodable is kept; a truncated
/// body is reported, not failed.
pub fn decode_snapshot(tree: &mut EntityTree, data: &[u8]) -> Result<TreeDecode, PersistError> {
    if data.len() < SNAPSHOT_HEADER_SIZE {
        return Err(CodecError::Truncated {
            needed: SNAPSHOT_HEADER_SIZE,
            remaining: data.len(),
        }
        .into());
    }
    if &data[..4] != SNAPSHOT_MAGIC {
        return Err(PersistError::BadMagic);
    }
    let version = u16::from_be_bytes([data[4], data[5]]);
    if version != SNAPSHOT_VERSION {
        return Err(PersistError::UnsupportedVersion(version));
    }

    let mut report = tree.decode(&data[SNAPSHOT_HEADER_SIZE..]);
    report.bytes_read += SNAPSHOT_HEADER_SIZE;
    Ok(report)
}

/// What an initial load found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// False if there was no snapshot file yet
    pub found: bool,
    pub decode: TreeDecode,
    pub elapsed: Duration,
}

/// Loads a tree snapshot on start, then saves it periodically while it
/// keeps changing.
#[derive(Debug, Clone)]
pub struct PersistWorker {
    tree: Arc<RwLock<EntityTree>>,
    config: PersistConfig,
    initial_load_complete: Arc<AtomicBool>,
    load_elapsed_usec: Arc<AtomicU64>,
}

impl PersistWorker {
    pub fn new(tree: Arc<RwLock<EntityTree>>, config: PersistConfig) -> Self {
        Self {
            tree,
            config,
            initial_load_complete: Arc::new(AtomicBool::new(false)),
            load_elapsed_usec: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn is_initial_load_complete(&self) -> bool {
        self.initial_load_complete.load(Ordering::Acquire)
    }

    /// Time the initial load took.
    pub fn load_elapsed(&self) -> Duration {
        Duration::from_micros(self.load_elapsed_usec.load(Ordering::Acquire))
    }

    /// Reads the snapshot file, if any, into the tree.
    pub async fn load(&self) -> Result<LoadReport, PersistError> {
        let started = Instant::now();
        let path = self.config.path.as_path();

        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("📂 No snapshot at {}, starting empty", path.display());
                return Ok(LoadReport::default());
            }
            Err(e) => return Err(io_error(path)(e)),
        };

        let decode = {
            let mut tree = self.tree.write().await;
            decode_snapshot(&mut tree, &data)?
        };
        if decode.truncated {
            warn!(
                bytes_read = decode.bytes_read,
                total = data.len(),
                "Snapshot ends mid-element, keeping what was readable"
            );
        } else if decode.bytes_read < data.len() {
            warn!(
                trailing = data.len() - decode.bytes_read,
                "Ignoring trailing bytes after snapshot"
            );
        }

        let report = LoadReport {
            found: true,
            decode,
            elapsed: started.elapsed(),
        };
        info!(
            "📂 Loaded {} entities in {} elements from {} in {:?}",
            report.decode.entities,
            report.decode.elements,
            path.display(),
            report.elapsed
        );
        Ok(report)
    }

    /// Writes the current tree to disk. Returns the tree's change stamp at
    /// the moment of the snapshot.
    pub async fn save(&self) -> Result<u64, PersistError> {
        let (snapshot, changed_at) = {
            let tree = self.tree.read().await;
            (encode_snapshot(&tree), tree.last_changed())
        };

        let path = self.config.path.as_path();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_error(parent))?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &snapshot).await.map_err(io_error(&tmp))?;
        tokio::fs::rename(&tmp, path).await.map_err(io_error(path))?;
        debug!(bytes = snapshot.len(), "💾 Saved snapshot to {}", path.display());
        Ok(changed_at)
    }

    /// Spawns the load-then-save loop. The task saves one last time after
    /// `shutdown` is initiated and resolves to the number of saves made.
    pub fn spawn(self, shutdown: ShutdownState) -> JoinHandle<u64> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    async fn run(self, shutdown: ShutdownState) -> u64 {
        let mut saved_at = match self.load().await {
            Ok(report) => {
                self.load_elapsed_usec
                    .store(report.elapsed.as_micros() as u64, Ordering::Release);
                self.tree.read().await.last_changed()
            }
            Err(e) => {
                error!("Failed to load snapshot from {}: {}", self.path().display(), e);
                0
            }
        };
        self.initial_load_complete.store(true, Ordering::Release);

        let mut saves = 0;
        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            let stopping = tokio::select! {
                _ = ticker.tick() => false,
                _ = shutdown.wait_for_shutdown() => true,
            };

            if self.tree.read().await.changed_since(saved_at) {
                match self.save().await {
                    Ok(changed_at) => {
                        saved_at = changed_at;
                        saves += 1;
                    }
                    Err(e) => error!("Failed to save snapshot: {}", e),
                }
            }
            if stopping {
                break;
            }
        }

        info!("💾 Persistence stopped after {} saves", saves);
        saves
    }
}
