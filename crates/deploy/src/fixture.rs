//! Snapshot-backed fixture cache for tests.
//!
//! The first load of a fixture runs its setup and snapshots the network right
//! after it. Every later load reverts the network to that snapshot and hands
//! back the cached result, so the setup's transactions run once per process.
//!
//! `evm_revert` consumes the snapshot it reverts to, along with every snapshot
//! taken after it. The cache therefore re-captures after each restore and
//! forgets entries younger than the one being restored.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
    future::Future,
    sync::atomic::{AtomicUsize, Ordering},
};

use tokio::sync::Mutex;

use crate::{Checkpoint, DeployError, ExecutionContext, FixtureError, Network, SnapshotId};

/// Identity of a fixture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FixtureKey {
    /// The type of the setup function. Every fn item and closure has its own.
    Function { id: TypeId, name: &'static str },
    Named(String),
}

impl FixtureKey {
    pub fn of<F: 'static>(_setup: &F) -> Self {
        Self::Function {
            id: TypeId::of::<F>(),
            name: std::any::type_name::<F>(),
        }
    }
}

impl fmt::Display for FixtureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function { name, .. } => f.write_str(name),
            Self::Named(name) => write!(f, "'{name}'"),
        }
    }
}

struct CacheEntry {
    snapshot: SnapshotId,
    /// Capture order; restoring an entry invalidates every younger one.
    sequence: u64,
    result: Box<dyn Any + Send + Sync>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<FixtureKey, CacheEntry>,
    next_sequence: u64,
}

impl CacheState {
    fn insert(
        &mut self,
        key: FixtureKey,
        snapshot: SnapshotId,
        result: Box<dyn Any + Send + Sync>,
    ) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.entries.insert(
            key,
            CacheEntry {
                snapshot,
                sequence,
                result,
            },
        );
    }
}

/// Process-lifetime fixture cache bound to one network.
///
/// Loads are serialized: the lock is held across setup, so concurrent loads of
/// the same uncached fixture run its setup once. A setup must not load
/// fixtures from the same cache.
pub struct FixtureCache<N> {
    ctx: ExecutionContext<N>,
    state: Mutex<CacheState>,
    restore_failures: AtomicUsize,
}

impl<N: Network + Checkpoint> FixtureCache<N> {
    pub fn new(ctx: ExecutionContext<N>) -> Self {
        Self {
            ctx,
            state: Mutex::new(CacheState::default()),
            restore_failures: AtomicUsize::new(0),
        }
    }

    pub fn context(&self) -> &ExecutionContext<N> {
        &self.ctx
    }

    /// Load the fixture produced by `setup`, keyed by the setup's type.
    pub async fn load<F, Fut, T, E>(&self, setup: F) -> Result<T, FixtureError>
    where
        F: FnOnce(ExecutionContext<N>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Clone + Send + Sync + 'static,
        E: Into<anyhow::Error>,
    {
        let key = FixtureKey::of(&setup);
        self.load_keyed(key, setup).await
    }

    /// Load a fixture under an explicit name, for setups built at runtime.
    pub async fn load_named<F, Fut, T, E>(
        &self,
        name: impl Into<String>,
        setup: F,
    ) -> Result<T, FixtureError>
    where
        F: FnOnce(ExecutionContext<N>) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Clone + Send + Sync + 'static,
        E: Into<anyhow::Error>,
    {
        self.load_keyed(FixtureKey::Named(name.into()), setup).await
    }

    /// Drop a cached fixture; its next load re-runs setup.
    pub async fn invalidate(&self, key: &FixtureKey) -> bool {
        self.state.lock().await.entries.remove(key).is_some()
    }

    pub async fn clear(&self) {
        self.state.lock().await.entries.clear();
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Snapshots that could not be restored and were replaced by a fresh setup.
    pub fn restore_failures(&self) -> usize {
        self.restore_failures.load(Ordering::Relaxed)
    }

    async fn load_keyed<F, Fut, T, E>(&self, key: FixtureKey, setup: F) -> Result<T, FixtureError>
    where
        F: FnOnce(ExecutionContext<N>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: Clone + Send + Sync + 'static,
        E: Into<anyhow::Error>,
    {
        let mut state = self.state.lock().await;

        if let Some(entry) = state.entries.remove(&key) {
            let Some(cached) = entry.result.downcast_ref::<T>().cloned() else {
                state.entries.insert(key.clone(), entry);
                return Err(FixtureError::TypeMismatch { key });
            };

            match self.ctx.network().restore(&entry.snapshot).await {
                Ok(()) => {
                    state
                        .entries
                        .retain(|_, other| other.sequence < entry.sequence);

                    let snapshot = self.capture(&key).await?;
                    state.insert(key.clone(), snapshot, entry.result);

                    tracing::debug!(fixture = %key, "Restored fixture snapshot");
                    return Ok(cached);
                }
                Err(source) => {
                    self.restore_failures.fetch_add(1, Ordering::Relaxed);
                    let err = FixtureError::SnapshotRestoreFailed {
                        key: key.clone(),
                        source,
                    };
                    tracing::warn!(error = %err, "Fixture invalidated, running setup again");
                }
            }
        }

        tracing::info!(fixture = %key, "Running fixture setup");
        let result = setup(self.ctx.clone())
            .await
            .map_err(|e| FixtureError::Setup {
                key: key.clone(),
                source: e.into(),
            })?;

        let snapshot = self.capture(&key).await?;
        state.insert(key, snapshot, Box::new(result.clone()));

        Ok(result)
    }

    async fn capture(&self, key: &FixtureKey) -> Result<SnapshotId, FixtureError> {
        self.ctx
            .network()
            .capture()
            .await
            .map_err(|source: DeployError| FixtureError::SnapshotCaptureFailed {
                key: key.clone(),
                source,
            })
    }
}
