use crate::snapshot::Snapshot;
use std::sync::Arc;
use tokio::sync::watch;

/// Latest-snapshot slot shared between the collection loop and readers.
///
/// Publishing swaps in a fully built `Arc<Snapshot>`; readers clone the `Arc`
/// and never hold the lock while doing anything else.
#[derive(Clone)]
pub struct SnapshotStore {
    tx: Arc<watch::Sender<Option<Arc<Snapshot>>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn publish(&self, snapshot: Snapshot) {
        self.tx.send_replace(Some(Arc::new(snapshot)));
    }

    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.tx.subscribe()
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
