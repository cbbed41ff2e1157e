//! Background synchronization of queued reviews
//!
//! Reviews written while offline wait in the outbox until a sync event with
//! the [`REVIEWS_SYNC_TAG`] tag arrives. The coordinator then uploads every
//! queued review concurrently and removes exactly the entries the server
//! accepted. Entries that failed, and entries queued while the drain was in
//! flight, stay in the outbox for the next drain.

use futures::future::join_all;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::data::{outbox, RestaurantApi, Review};
use crate::store::{self, KeyValueStore, StoreError, REVIEWS_KEY};

/// Tag requested when a review is queued
pub const REVIEWS_SYNC_TAG: &str = "reviews-sync";

/// Errors that can abort a drain
#[derive(Debug, Error)]
pub enum SyncError {
    /// The outbox could not be read or rewritten
    #[error("Outbox storage failed: {0}")]
    Store(#[from] StoreError),
}

/// A named sync request delivered to the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEvent {
    pub tag: String,
}

/// Lets the foreground request a background sync by tag
#[derive(Debug, Clone)]
pub struct SyncRegistrar {
    sender: Option<mpsc::UnboundedSender<SyncEvent>>,
}

impl SyncRegistrar {
    /// Creates a registrar and the receiving end consumed by the coordinator
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// A registrar with no coordinator listening
    ///
    /// Queued entries are durable, so a later drain still picks them up.
    pub fn detached() -> Self {
        Self { sender: None }
    }

    /// Requests a sync for `tag`. Returns whether a coordinator received it.
    pub fn register(&self, tag: &str) -> bool {
        let delivered = self.sender.as_ref().map_or(false, |sender| {
            sender
                .send(SyncEvent {
                    tag: tag.to_string(),
                })
                .is_ok()
        });
        if delivered {
            debug!(tag, "Sync registered");
        } else {
            debug!(tag, "No sync coordinator listening; entries stay queued");
        }
        delivered
    }
}

/// Coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Draining,
}

/// Result of one pass over the outbox
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Entries found in the outbox when the drain started
    pub attempted: usize,
    /// Entries the server accepted and that were removed
    pub succeeded: usize,
    /// Entries that failed and were kept
    pub failed: usize,
    /// Entries left in the outbox after the drain
    pub remaining: usize,
}

/// What a drain request did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    Completed(DrainReport),
    /// Another drain was already running; nothing was done
    AlreadyDraining,
}

/// Resets the draining flag however the drain ends
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Uploads queued reviews and prunes the outbox
pub struct SyncCoordinator {
    store: Arc<dyn KeyValueStore>,
    api: Arc<dyn RestaurantApi>,
    draining: AtomicBool,
}

impl SyncCoordinator {
    pub fn new(store: Arc<dyn KeyValueStore>, api: Arc<dyn RestaurantApi>) -> Self {
        Self {
            store,
            api,
            draining: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> SyncState {
        if self.draining.load(Ordering::SeqCst) {
            SyncState::Draining
        } else {
            SyncState::Idle
        }
    }

    /// Number of reviews currently waiting in the outbox
    pub async fn pending_count(&self) -> Result<usize, SyncError> {
        Ok(outbox::load(self.store.as_ref()).await?.len())
    }

    /// Handles a sync event; events for other tags are ignored
    pub async fn on_sync(&self, event: &SyncEvent) -> Result<Option<DrainOutcome>, SyncError> {
        if event.tag != REVIEWS_SYNC_TAG {
            debug!(tag = %event.tag, "Ignoring sync event for unknown tag");
            return Ok(None);
        }
        self.drain().await.map(Some)
    }

    /// Uploads every queued review and keeps only the failures
    pub async fn drain(&self) -> Result<DrainOutcome, SyncError> {
        if self
            .draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Drain already in progress");
            return Ok(DrainOutcome::AlreadyDraining);
        }
        let _guard = DrainGuard(&self.draining);

        let pending = outbox::load(self.store.as_ref()).await?;
        if pending.is_empty() {
            info!("No reviews waiting for sync");
            return Ok(DrainOutcome::Completed(DrainReport::default()));
        }

        info!(count = pending.len(), "Syncing queued reviews");
        let uploads = pending.iter().map(|entry| async move {
            let result = self.api.post_review(&entry.to_new_review(), entry.token).await;
            (entry, result)
        });

        let mut synced: HashSet<Uuid> = HashSet::new();
        let mut confirmed: Vec<Review> = Vec::new();
        for (entry, result) in join_all(uploads).await {
            match result {
                Ok(stored) => {
                    debug!(token = %entry.token, "Review synced");
                    synced.insert(entry.token);
                    // Without a server id the review only shows up after the
                    // next reviews refresh
                    confirmed.extend(stored);
                }
                Err(e) => {
                    warn!(
                        token = %entry.token,
                        restaurant_id = entry.review.restaurant_id,
                        error = %e,
                        "Review upload failed; keeping it queued"
                    );
                }
            }
        }

        let succeeded = synced.len();
        let remaining = self.remove_synced(synced).await?;
        if !confirmed.is_empty() {
            self.merge_into_reviews_snapshot(confirmed).await;
        }

        let report = DrainReport {
            attempted: pending.len(),
            succeeded,
            failed: pending.len() - succeeded,
            remaining,
        };
        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            remaining = report.remaining,
            "Review sync finished"
        );
        Ok(DrainOutcome::Completed(report))
    }

    /// Atomically removes synced entries from the outbox, deleting the key
    /// once it is empty. Returns how many readable entries are left.
    async fn remove_synced(&self, synced: HashSet<Uuid>) -> Result<usize, SyncError> {
        let left = outbox::modify(self.store.as_ref(), move |entries| {
            entries.retain(|entry| !synced.contains(&entry.token))
        })
        .await?;
        Ok(left.len())
    }

    /// Appends confirmed reviews to the cached reviews snapshot, if one exists
    async fn merge_into_reviews_snapshot(&self, confirmed: Vec<Review>) {
        let result = store::update_typed(
            self.store.as_ref(),
            REVIEWS_KEY,
            move |current: Option<Vec<Review>>| {
                current.map(|mut reviews| {
                    reviews.extend(confirmed);
                    reviews
                })
            },
        )
        .await;
        if let Err(e) = result {
            warn!(error = %e, "Failed to add synced reviews to the local snapshot");
        }
    }
}

/// Messages sent from the background sync task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMessage {
    /// A drain finished
    Drained(DrainReport),
    /// A drain was requested while another was running
    Skipped,
    /// A drain could not read or rewrite the outbox
    Failed(String),
}

/// Configuration for the background sync task
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    /// When set, the outbox is re-checked on this interval and drained if
    /// it still holds entries (the first check runs immediately). A zero
    /// interval disables retries like `None`.
    pub retry_interval: Option<Duration>,
}

/// Handle for controlling the background sync task
pub struct SyncHandle {
    /// Channel for receiving sync progress
    pub receiver: mpsc::Receiver<SyncMessage>,
    /// Flag to signal shutdown
    shutdown_tx: mpsc::Sender<()>,
}

impl SyncHandle {
    /// Spawns a task that drains the outbox whenever `events` delivers a
    /// reviews sync event, and on every retry tick while entries remain
    pub fn spawn(
        coordinator: Arc<SyncCoordinator>,
        mut events: mpsc::UnboundedReceiver<SyncEvent>,
        config: SyncConfig,
    ) -> Self {
        let (msg_tx, msg_rx) = mpsc::channel(32);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            let mut retry = config
                .retry_interval
                .filter(|period| !period.is_zero())
                .map(|period| {
                    let mut interval = tokio::time::interval(period);
                    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                    interval
                });
            let mut events_open = true;

            loop {
                let outcome = tokio::select! {
                    event = events.recv(), if events_open => match event {
                        Some(event) => coordinator.on_sync(&event).await,
                        None => {
                            events_open = false;
                            continue;
                        }
                    },
                    _ = tick(&mut retry) => match coordinator.pending_count().await {
                        Ok(0) => continue,
                        Ok(_) => coordinator.drain().await.map(Some),
                        Err(e) => Err(e),
                    },
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                };

                let message = match outcome {
                    Ok(Some(DrainOutcome::Completed(report))) => SyncMessage::Drained(report),
                    Ok(Some(DrainOutcome::AlreadyDraining)) => SyncMessage::Skipped,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(error = %e, "Review sync failed");
                        SyncMessage::Failed(e.to_string())
                    }
                };
                let _ = msg_tx.send(message).await;
            }
            debug!("Sync task stopped");
        });

        Self {
            receiver: msg_rx,
            shutdown_tx,
        }
    }

    /// Shuts down the background sync task
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Waits for the next retry tick, or forever when retries are disabled
async fn tick(retry: &mut Option<tokio::time::Interval>) {
    match retry {
        Some(interval) => {
            interval.tick().await;
        }
        None => futures::future::pending::<()>().await,
    }
}
