use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded, unbounded};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::CacheError;
use crate::fingerprint::Fingerprint;
use crate::ir::PositionMap;

/// Key-value storage that survives process restarts.
pub trait DurableStore: Send {
    fn load(&mut self, key: Fingerprint) -> Result<Option<PositionMap>, CacheError>;
    fn store(&mut self, key: Fingerprint, positions: &PositionMap) -> Result<(), CacheError>;
    fn clear(&mut self) -> Result<(), CacheError>;
}

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, CacheError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), CacheError> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;

            CREATE TABLE IF NOT EXISTS layout_cache (
              fingerprint TEXT PRIMARY KEY,
              positions TEXT NOT NULL,
              written_at_ms INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

impl DurableStore for SqliteStore {
    fn load(&mut self, key: Fingerprint) -> Result<Option<PositionMap>, CacheError> {
        let key = key.to_key();
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT positions FROM layout_cache WHERE fingerprint = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let positions: PositionMap =
            serde_json::from_str(&raw).map_err(|source| CacheError::Corrupt { key, source })?;
        Ok(Some(positions))
    }

    fn store(&mut self, key: Fingerprint, positions: &PositionMap) -> Result<(), CacheError> {
        let finite: PositionMap = positions
            .iter()
            .filter(|(_, position)| position.is_finite())
            .map(|(id, position)| (id.clone(), *position))
            .collect();
        let raw = serde_json::to_string(&finite)?;
        self.conn.execute(
            r#"
            INSERT INTO layout_cache(fingerprint, positions, written_at_ms)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(fingerprint) DO UPDATE SET
              positions = excluded.positions,
              written_at_ms = excluded.written_at_ms
            "#,
            params![key.to_key(), raw, now_ms()],
        )?;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), CacheError> {
        self.conn.execute("DELETE FROM layout_cache", [])?;
        Ok(())
    }
}

enum Command {
    Load {
        key: Fingerprint,
        reply: Sender<Option<PositionMap>>,
    },
    Store {
        key: Fingerprint,
        positions: PositionMap,
    },
    Clear,
}

pub enum LoadState {
    Ready(Option<PositionMap>),
    Waiting,
}

/// A durable-tier read in flight. Resolves to `None` on a miss or on any
/// storage failure.
pub struct PendingLoad {
    reply: Receiver<Option<PositionMap>>,
}

impl PendingLoad {
    pub fn poll(&self) -> LoadState {
        match self.reply.try_recv() {
            Ok(result) => LoadState::Ready(result),
            Err(TryRecvError::Empty) => LoadState::Waiting,
            Err(TryRecvError::Disconnected) => LoadState::Ready(None),
        }
    }

    pub fn wait_timeout(&self, timeout: Duration) -> LoadState {
        match self.reply.recv_timeout(timeout) {
            Ok(result) => LoadState::Ready(result),
            Err(RecvTimeoutError::Timeout) => LoadState::Waiting,
            Err(RecvTimeoutError::Disconnected) => LoadState::Ready(None),
        }
    }

    pub fn wait(self) -> Option<PositionMap> {
        self.reply.recv().ok().flatten()
    }
}

/// Owns a [`DurableStore`] on a dedicated I/O thread so that reads and writes
/// never run on the caller's thread.
pub struct DurableTier {
    commands: Option<Sender<Command>>,
    handle: Option<JoinHandle<()>>,
}

impl DurableTier {
    pub fn spawn<S: DurableStore + 'static>(store: S) -> Result<Self, CacheError> {
        let (commands, receiver) = unbounded();
        let handle = std::thread::Builder::new()
            .name("layout-cache-io".to_string())
            .spawn(move || run_io_loop(store, receiver))?;
        Ok(Self {
            commands: Some(commands),
            handle: Some(handle),
        })
    }

    pub fn load(&self, key: Fingerprint) -> PendingLoad {
        let (reply, receiver) = bounded(1);
        if let Some(commands) = &self.commands
            && commands.send(Command::Load { key, reply }).is_err()
        {
            tracing::warn!(fingerprint = %key, "durable cache tier is closed");
        }
        PendingLoad { reply: receiver }
    }

    /// Fire-and-forget write.
    pub fn store(&self, key: Fingerprint, positions: PositionMap) {
        let Some(commands) = &self.commands else {
            return;
        };
        if commands.send(Command::Store { key, positions }).is_err() {
            tracing::warn!(fingerprint = %key, "durable cache tier is closed, write dropped");
        }
    }

    pub fn clear(&self) {
        if let Some(commands) = &self.commands {
            let _ = commands.send(Command::Clear);
        }
    }
}

impl Drop for DurableTier {
    fn drop(&mut self) {
        // Closing the channel lets the I/O thread drain queued writes and exit.
        self.commands.take();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::warn!("layout cache i/o thread panicked");
        }
    }
}

fn run_io_loop<S: DurableStore>(mut store: S, receiver: Receiver<Command>) {
    for command in receiver {
        match command {
            Command::Load { key, reply } => {
                let result = match store.load(key) {
                    Ok(result) => result,
                    Err(err) => {
                        tracing::warn!(
                            fingerprint = %key,
                            error = %err,
                            "durable cache read failed"
                        );
                        None
                    }
                };
                let _ = reply.send(result);
            }
            Command::Store { key, positions } => {
                if let Err(err) = store.store(key, &positions) {
                    tracing::warn!(
                        fingerprint = %key,
                        error = %err,
                        "durable cache write failed"
                    );
                }
            }
            Command::Clear => {
                if let Err(err) = store.clear() {
                    tracing::warn!(error = %err, "durable cache clear failed");
                }
            }
        }
    }
    tracing::debug!("layout cache i/o thread stopped");
}
