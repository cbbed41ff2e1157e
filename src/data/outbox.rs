//! Reading and rewriting the pending review outbox
//!
//! Entries are stored as `{token, review}` objects. Earlier clients queued
//! bare review objects instead; those are given a token and rewritten the
//! first time the outbox is touched, so the token stays stable across
//! drains. Values matching neither shape are skipped and left in place.

use serde_json::Value;
use tracing::warn;

use super::{PendingReview, Review};
use crate::store::{KeyValueStore, StoreError, OUTBOX_KEY};

/// Parsed outbox contents
#[derive(Debug, Default)]
struct Outbox {
    entries: Vec<PendingReview>,
    /// Stored values matching neither entry shape, kept verbatim
    unreadable: Vec<Value>,
    /// Whether any bare review was wrapped while parsing
    upgraded: bool,
}

impl Outbox {
    fn parse(value: Option<Value>) -> Self {
        let items = match value {
            None => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(other) => vec![other],
        };

        let mut outbox = Self::default();
        for item in items {
            if let Ok(entry) = serde_json::from_value::<PendingReview>(item.clone()) {
                outbox.entries.push(entry);
            } else if let Ok(review) = serde_json::from_value::<Review>(item.clone()) {
                outbox.entries.push(PendingReview::from_review(review));
                outbox.upgraded = true;
            } else {
                outbox.unreadable.push(item);
            }
        }
        outbox
    }

    fn warn_unreadable(&self) {
        if !self.unreadable.is_empty() {
            warn!(
                count = self.unreadable.len(),
                "Skipping unreadable outbox entries; they are left in storage"
            );
        }
    }

    /// Serialized form, `None` once nothing at all is left
    fn into_value(self) -> Result<Option<Value>, StoreError> {
        if self.entries.is_empty() && self.unreadable.is_empty() {
            return Ok(None);
        }
        let mut items = self
            .entries
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        items.extend(self.unreadable);
        Ok(Some(Value::Array(items)))
    }
}

/// Returns every readable outbox entry, oldest first
pub(crate) async fn load(store: &dyn KeyValueStore) -> Result<Vec<PendingReview>, StoreError> {
    let outbox = Outbox::parse(store.get(OUTBOX_KEY).await?);
    if outbox.upgraded {
        return modify(store, |_| {}).await;
    }
    outbox.warn_unreadable();
    Ok(outbox.entries)
}

/// Atomically applies `f` to the readable entries and returns the entries
/// left afterwards. Unreadable values are carried over untouched.
pub(crate) async fn modify<F>(
    store: &dyn KeyValueStore,
    f: F,
) -> Result<Vec<PendingReview>, StoreError>
where
    F: FnOnce(&mut Vec<PendingReview>) + Send + 'static,
{
    let written = store
        .update(
            OUTBOX_KEY,
            Box::new(move |current: Option<Value>| -> Result<Option<Value>, StoreError> {
                let mut outbox = Outbox::parse(current);
                outbox.warn_unreadable();
                f(&mut outbox.entries);
                outbox.into_value()
            }),
        )
        .await?;
    Ok(Outbox::parse(written).entries)
}
