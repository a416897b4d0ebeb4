use crate::error::{LedgerError, Result};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of per-row mutexes shared by the store backends.
///
/// Rows get a mutex lazily on first lock; entries are never removed, which
/// keeps handles stable for the lifetime of the store.
pub(crate) type RowLocks<K> = Arc<Mutex<HashMap<K, Arc<Mutex<()>>>>>;

pub(crate) async fn handle_for<K>(registry: &RowLocks<K>, key: K) -> Arc<Mutex<()>>
where
    K: Hash + Eq,
{
    let mut locks = registry.lock().await;
    locks.entry(key).or_default().clone()
}

/// Waits for the row mutex, bounded so a stuck holder surfaces as
/// `LockTimeout` instead of hanging the caller.
pub(crate) async fn acquire(
    handle: Arc<Mutex<()>>,
    timeout: Duration,
) -> Result<OwnedMutexGuard<()>> {
    tokio::time::timeout(timeout, handle.lock_owned())
        .await
        .map_err(|_| LedgerError::LockTimeout)
}
