// Pending transaction tracking module
// This file maintains the set of broadcast transactions awaiting inclusion
// and fans status updates out to watchers

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, B256};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::errors::RouterError;
use crate::types::MultiTransactionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Success,
    Failed,
}

impl TxStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TxStatus::Pending)
    }
}

#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub chain_id: u64,
    pub hash: B256,
    pub status: TxStatus,
}

#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub chain_id: u64,
    pub hash: B256,
    pub from: Address,
    pub multi_transaction_id: Option<MultiTransactionId>,
}

/// Tracks broadcast transactions until a status event arrives. Status events
/// come from the host's inclusion monitor; the tracker itself never polls.
#[derive(Clone)]
pub struct PendingTxTracker {
    pending: Arc<RwLock<HashMap<(u64, B256), PendingEntry>>>,
    resolved: Arc<RwLock<HashMap<(u64, B256), TxStatus>>>,
    tx: broadcast::Sender<StatusUpdate>,
    timeout: Duration,
}

impl PendingTxTracker {
    pub fn new(timeout: Duration) -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            pending: Arc::new(RwLock::new(HashMap::new())),
            resolved: Arc::new(RwLock::new(HashMap::new())),
            tx,
            timeout,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusUpdate> {
        self.tx.subscribe()
    }

    pub async fn store_and_track(&self, entry: PendingEntry) {
        let key = (entry.chain_id, entry.hash);
        debug!(chain_id = entry.chain_id, hash = %entry.hash, "tracking pending tx");
        self.pending.write().await.insert(key, entry);
    }

    pub async fn pending_for(&self, from: Address) -> Vec<PendingEntry> {
        self.pending
            .read()
            .await
            .values()
            .filter(|e| e.from == from)
            .cloned()
            .collect()
    }

    /// Records a status event and wakes watchers. Terminal statuses drop the
    /// pending entry.
    pub async fn notify_status_changed(&self, chain_id: u64, hash: B256, status: TxStatus) {
        if status.is_terminal() {
            self.pending.write().await.remove(&(chain_id, hash));
            self.resolved.write().await.insert((chain_id, hash), status);
        }
        let _ = self.tx.send(StatusUpdate {
            chain_id,
            hash,
            status,
        });
    }

    /// Resolves on the first status event for the transaction, whatever the
    /// status. Times out after the configured deadline.
    ///
    /// A stored terminal status is handed to exactly one watcher; later
    /// watches wait on the live stream.
    pub async fn watch(&self, chain_id: u64, hash: B256) -> Result<TxStatus, RouterError> {
        let mut rx = self.tx.subscribe();
        if let Some(status) = self.resolved.write().await.remove(&(chain_id, hash)) {
            return Ok(status);
        }
        let wait = async {
            loop {
                match rx.recv().await {
                    Ok(update) if update.chain_id == chain_id && update.hash == hash => {
                        return Ok(update.status);
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(RouterError::WatchPendingTxTimeout)
                    }
                }
            }
        };
        match tokio::time::timeout(self.timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(RouterError::WatchPendingTxTimeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(chain_id: u64, hash: B256) -> PendingEntry {
        PendingEntry {
            chain_id,
            hash,
            from: Address::repeat_byte(0xaa),
            multi_transaction_id: None,
        }
    }

    #[tokio::test]
    async fn watch_resolves_on_first_status_event() {
        let tracker = PendingTxTracker::new(Duration::from_secs(5));
        let hash = B256::repeat_byte(1);
        tracker.store_and_track(entry(1, hash)).await;

        let watcher = tracker.clone();
        let handle = tokio::spawn(async move { watcher.watch(1, hash).await });
        tokio::task::yield_now().await;
        tracker.notify_status_changed(1, hash, TxStatus::Failed).await;

        assert_eq!(handle.await.unwrap().unwrap(), TxStatus::Failed);
        assert!(tracker.pending_for(Address::repeat_byte(0xaa)).await.is_empty());
    }

    #[tokio::test]
    async fn watch_ignores_other_transactions() {
        let tracker = PendingTxTracker::new(Duration::from_secs(5));
        let hash = B256::repeat_byte(2);
        let other = B256::repeat_byte(3);
        tracker.store_and_track(entry(1, hash)).await;

        let watcher = tracker.clone();
        let handle = tokio::spawn(async move { watcher.watch(1, hash).await });
        tokio::task::yield_now().await;
        tracker.notify_status_changed(1, other, TxStatus::Success).await;
        tracker.notify_status_changed(2, hash, TxStatus::Success).await;
        tracker.notify_status_changed(1, hash, TxStatus::Success).await;

        assert_eq!(handle.await.unwrap().unwrap(), TxStatus::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn watch_times_out_without_status() {
        let tracker = PendingTxTracker::new(Duration::from_secs(1));
        let hash = B256::repeat_byte(4);
        tracker.store_and_track(entry(1, hash)).await;

        let result = tracker.watch(1, hash).await;
        assert!(matches!(result, Err(RouterError::WatchPendingTxTimeout)));
    }

    #[tokio::test]
    async fn status_before_watch_resolves_immediately() {
        let tracker = PendingTxTracker::new(Duration::from_millis(50));
        let hash = B256::repeat_byte(5);
        tracker.store_and_track(entry(1, hash)).await;
        tracker.notify_status_changed(1, hash, TxStatus::Success).await;

        assert_eq!(tracker.watch(1, hash).await.unwrap(), TxStatus::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn stored_status_is_handed_out_once() {
        let tracker = PendingTxTracker::new(Duration::from_secs(1));
        let hash = B256::repeat_byte(6);
        tracker.store_and_track(entry(1, hash)).await;
        tracker.notify_status_changed(1, hash, TxStatus::Success).await;

        assert_eq!(tracker.watch(1, hash).await.unwrap(), TxStatus::Success);
        assert!(matches!(
            tracker.watch(1, hash).await,
            Err(RouterError::WatchPendingTxTimeout)
        ));
    }
}
