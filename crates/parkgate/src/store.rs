//! Token registry and reservation set with write-through persistence.
//!
//! Every mutation builds the next snapshot, hands it to [`TokenStorage`], and
//! only swaps it in once storage reports success. A failed save leaves the
//! in-memory sets exactly as they were.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{GateError, Result};
use crate::token::TokenId;

/// The two durable records: registered cards and the reserved subset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSnapshot {
    pub registered: BTreeSet<TokenId>,
    pub reserved: BTreeSet<TokenId>,
}

impl TokenSnapshot {
    /// Drop reserved entries that are not registered.
    ///
    /// Returns the entries that were removed.
    fn repair(&mut self) -> Vec<TokenId> {
        let orphans: Vec<TokenId> = self
            .reserved
            .difference(&self.registered)
            .cloned()
            .collect();
        for id in &orphans {
            self.reserved.remove(id);
        }
        orphans
    }
}

/// Durable backing for [`TokenStore`].
///
/// `save` must not return until both records are durable.
pub trait TokenStorage: Send + Sync {
    fn load(&self) -> Result<TokenSnapshot>;
    fn save(&self, snapshot: &TokenSnapshot) -> Result<()>;
}

/// Two JSON files: `{"<uid>": true}` for the registry and `["<uid>"]` for
/// reservations.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    registry_path: PathBuf,
    reserved_path: PathBuf,
}

impl JsonFileStorage {
    pub const REGISTRY_FILE: &'static str = "rfid_data.json";
    pub const RESERVED_FILE: &'static str = "reserved_data.json";

    pub fn new(registry_path: impl Into<PathBuf>, reserved_path: impl Into<PathBuf>) -> Self {
        Self {
            registry_path: registry_path.into(),
            reserved_path: reserved_path.into(),
        }
    }

    /// Storage using the default file names inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(dir.join(Self::REGISTRY_FILE), dir.join(Self::RESERVED_FILE))
    }

    pub fn registry_path(&self) -> &Path {
        &self.registry_path
    }

    pub fn reserved_path(&self) -> &Path {
        &self.reserved_path
    }

    fn read_record(path: &Path) -> Result<Option<String>> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(GateError::persistence(path, e)),
        }
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// `true` if `path` already holds exactly `data`.
fn unchanged(path: &Path, data: &[u8]) -> bool {
    fs::read(path).is_ok_and(|current| current == data)
}

/// Write `data` to `{path}.tmp` and fsync it. The caller renames it into place.
fn stage(path: &Path, data: &[u8]) -> Result<PathBuf> {
    let tmp = sibling(path, ".tmp");

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| GateError::persistence(parent, e))?;
    }

    let write = || -> std::io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()
    };
    write().map_err(|e| GateError::persistence(&tmp, e))?;
    Ok(tmp)
}

/// Move a staged file into place, discarding it on failure.
fn install(tmp: &Path, path: &Path) -> Result<()> {
    fs::rename(tmp, path).map_err(|e| {
        let _ = fs::remove_file(tmp);
        GateError::persistence(path, e)
    })
}

fn discard(tmp: Option<&PathBuf>) {
    if let Some(tmp) = tmp {
        let _ = fs::remove_file(tmp);
    }
}

impl TokenStorage for JsonFileStorage {
    fn load(&self) -> Result<TokenSnapshot> {
        let mut snapshot = TokenSnapshot::default();

        if let Some(text) = Self::read_record(&self.registry_path)? {
            // Values are presence flags; only the keys matter.
            let record: BTreeMap<String, serde_json::Value> = serde_json::from_str(&text)
                .map_err(|e| GateError::persistence(&self.registry_path, e))?;
            snapshot.registered = record.into_keys().map(TokenId::new).collect();
        }

        if let Some(text) = Self::read_record(&self.reserved_path)? {
            let record: Vec<TokenId> = serde_json::from_str(&text)
                .map_err(|e| GateError::persistence(&self.reserved_path, e))?;
            snapshot.reserved = record.into_iter().collect();
        }

        Ok(snapshot)
    }

    fn save(&self, snapshot: &TokenSnapshot) -> Result<()> {
        let registry: BTreeMap<&str, bool> = snapshot
            .registered
            .iter()
            .map(|id| (id.as_str(), true))
            .collect();
        let reserved: Vec<&TokenId> = snapshot.reserved.iter().collect();

        let registry_json = serde_json::to_vec(&registry)
            .map_err(|e| GateError::persistence(&self.registry_path, e))?;
        let reserved_json = serde_json::to_vec(&reserved)
            .map_err(|e| GateError::persistence(&self.reserved_path, e))?;

        // Only records whose bytes change are rewritten, so a reservation or
        // a change that leaves the reserved list alone is a single rename.
        let registry_tmp = if unchanged(&self.registry_path, &registry_json) {
            None
        } else {
            Some(stage(&self.registry_path, &registry_json)?)
        };
        let reserved_tmp = if unchanged(&self.reserved_path, &reserved_json) {
            None
        } else {
            match stage(&self.reserved_path, &reserved_json) {
                Ok(tmp) => Some(tmp),
                Err(e) => {
                    discard(registry_tmp.as_ref());
                    return Err(e);
                }
            }
        };

        match (registry_tmp, reserved_tmp) {
            (None, None) => Ok(()),
            (Some(registry_tmp), None) => install(&registry_tmp, &self.registry_path),
            (None, Some(reserved_tmp)) => install(&reserved_tmp, &self.reserved_path),
            (Some(registry_tmp), Some(reserved_tmp)) => {
                self.install_both(&registry_tmp, &reserved_tmp)
            }
        }
    }
}

impl JsonFileStorage {
    /// Registry first, then reservations. A crash between the renames leaves
    /// at worst a reservation for a removed card, which `load` discards. If
    /// the second rename fails the previous registry is put back, so a failed
    /// save changes neither file.
    fn install_both(&self, registry_tmp: &Path, reserved_tmp: &Path) -> Result<()> {
        let backup = sibling(&self.registry_path, ".bak");
        let had_registry = match fs::copy(&self.registry_path, &backup) {
            Ok(_) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                let _ = fs::remove_file(registry_tmp);
                let _ = fs::remove_file(reserved_tmp);
                return Err(GateError::persistence(&backup, e));
            }
        };

        if let Err(e) = install(registry_tmp, &self.registry_path) {
            let _ = fs::remove_file(reserved_tmp);
            let _ = fs::remove_file(&backup);
            return Err(e);
        }

        if let Err(e) = install(reserved_tmp, &self.reserved_path) {
            let restored = if had_registry {
                fs::rename(&backup, &self.registry_path)
            } else {
                fs::remove_file(&self.registry_path)
            };
            if let Err(restore) = restored {
                tracing::error!(
                    path = %self.registry_path.display(),
                    error = %restore,
                    "Failed to restore registry after partial save"
                );
            }
            return Err(e);
        }

        if had_registry {
            let _ = fs::remove_file(&backup);
        }
        Ok(())
    }
}

/// Volatile storage. Clones share the same records, so a test can keep one
/// handle to inspect what was saved or to make saves fail.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    saved: Arc<Mutex<TokenSnapshot>>,
    fail_saves: Arc<AtomicBool>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: TokenSnapshot) -> Self {
        Self {
            saved: Arc::new(Mutex::new(snapshot)),
            fail_saves: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_saves.store(failing, Ordering::SeqCst);
    }

    pub fn saved(&self) -> TokenSnapshot {
        match self.saved.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl TokenStorage for MemoryStorage {
    fn load(&self) -> Result<TokenSnapshot> {
        Ok(self.saved())
    }

    fn save(&self, snapshot: &TokenSnapshot) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(GateError::persistence(
                "memory",
                std::io::Error::other("injected save failure"),
            ));
        }
        match self.saved.lock() {
            Ok(mut guard) => *guard = snapshot.clone(),
            Err(poisoned) => *poisoned.into_inner() = snapshot.clone(),
        }
        Ok(())
    }
}

/// Registered and reserved cards.
///
/// Invariant: `reserved ⊆ registered`.
pub struct TokenStore {
    current: TokenSnapshot,
    storage: Box<dyn TokenStorage>,
}

impl TokenStore {
    /// Load from storage. Missing records mean an empty store.
    pub fn load(storage: Box<dyn TokenStorage>) -> Result<Self> {
        let mut current = storage.load()?;
        for orphan in current.repair() {
            tracing::warn!(token = %orphan, "Dropping reservation for unregistered card");
        }
        tracing::info!(
            registered = current.registered.len(),
            reserved = current.reserved.len(),
            "Token store loaded"
        );
        Ok(Self { current, storage })
    }

    /// Empty store backed by [`MemoryStorage`].
    pub fn in_memory() -> Self {
        Self {
            current: TokenSnapshot::default(),
            storage: Box::new(MemoryStorage::new()),
        }
    }

    pub fn is_registered(&self, id: &TokenId) -> bool {
        self.current.registered.contains(id)
    }

    pub fn is_reserved(&self, id: &TokenId) -> bool {
        self.current.reserved.contains(id)
    }

    pub fn registered_count(&self) -> usize {
        self.current.registered.len()
    }

    pub fn reserved_count(&self) -> usize {
        self.current.reserved.len()
    }

    pub fn snapshot(&self) -> &TokenSnapshot {
        &self.current
    }

    pub fn register(&mut self, id: TokenId) -> Result<()> {
        if self.is_registered(&id) {
            return Err(GateError::AlreadyRegistered(id));
        }
        let mut next = self.current.clone();
        next.registered.insert(id);
        self.commit(next)
    }

    /// Remove a card from the registry and from the reservation set in one save.
    pub fn unregister(&mut self, id: &TokenId) -> Result<()> {
        if !self.is_registered(id) {
            return Err(GateError::NotRegistered(id.clone()));
        }
        let mut next = self.current.clone();
        next.registered.remove(id);
        next.reserved.remove(id);
        self.commit(next)
    }

    /// Idempotent: reserving an already reserved card is a successful no-op.
    pub fn reserve(&mut self, id: &TokenId) -> Result<()> {
        if !self.is_registered(id) {
            return Err(GateError::Unregistered(id.clone()));
        }
        if self.is_reserved(id) {
            return Ok(());
        }
        let mut next = self.current.clone();
        next.reserved.insert(id.clone());
        self.commit(next)
    }

    fn commit(&mut self, next: TokenSnapshot) -> Result<()> {
        debug_assert!(next.reserved.is_subset(&next.registered));
        self.storage.save(&next)?;
        self.current = next;
        Ok(())
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("registered", &self.current.registered)
            .field("reserved", &self.current.reserved)
            .finish_non_exhaustive()
    }
}
