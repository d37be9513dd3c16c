//! Short-lived, single-use staging of preview snapshots.
use crate::error::PreviewError;
use crate::model::{BatchAction, EntityItem, PreviewResponse, PreviewStats};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_PREVIEW_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewSnapshot {
    pub token: String,
    pub action: BatchAction,
    pub items: Vec<EntityItem>,
    pub warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PreviewSnapshot {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug)]
pub struct PreviewStore {
    ttl: chrono::Duration,
    snapshots: Mutex<HashMap<String, PreviewSnapshot>>,
}

impl Default for PreviewStore {
    fn default() -> Self {
        Self::new(DEFAULT_PREVIEW_TTL)
    }
}

impl PreviewStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: chrono::Duration::from_std(ttl)
                .unwrap_or_else(|_| chrono::Duration::days(36_500)),
            snapshots: Mutex::new(HashMap::new()),
        }
    }

    /// Stage `items` under a fresh token. Expired entries are swept first.
    pub fn create(
        &self,
        action: BatchAction,
        items: Vec<EntityItem>,
        warnings: Vec<String>,
    ) -> PreviewResponse {
        let now = Utc::now();
        let token = Uuid::new_v4().to_string();
        let expires_at = now
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut snapshots = self.snapshots.lock();
        sweep(&mut snapshots, now);
        snapshots.insert(
            token.clone(),
            PreviewSnapshot {
                token: token.clone(),
                action,
                items: items.clone(),
                warnings: warnings.clone(),
                created_at: now,
                expires_at,
            },
        );
        debug!(action = action.as_str(), total = items.len(), "staged preview");

        PreviewResponse {
            preview_token: token,
            total: items.len(),
            items,
            warnings,
            expires_at,
        }
    }

    /// Redeem a token. On success the snapshot is gone; on an action mismatch
    /// it stays in place.
    pub fn consume(
        &self,
        token: &str,
        expected_action: BatchAction,
    ) -> Result<Vec<EntityItem>, PreviewError> {
        let now = Utc::now();
        let mut snapshots = self.snapshots.lock();
        sweep(&mut snapshots, now);

        let entry = snapshots.get(token).ok_or(PreviewError::TokenInvalid)?;
        if entry.action != expected_action {
            return Err(PreviewError::ActionMismatch);
        }
        snapshots
            .remove(token)
            .map(|snapshot| snapshot.items)
            .ok_or(PreviewError::TokenInvalid)
    }

    pub fn get(&self, token: &str) -> Option<PreviewSnapshot> {
        let now = Utc::now();
        let snapshots = self.snapshots.lock();
        snapshots
            .get(token)
            .filter(|snapshot| !snapshot.is_expired(now))
            .cloned()
    }

    pub fn stats(&self) -> PreviewStats {
        let now = Utc::now();
        let snapshots = self.snapshots.lock();
        snapshots
            .values()
            .filter(|snapshot| !snapshot.is_expired(now))
            .fold(PreviewStats::default(), |mut acc, snapshot| {
                acc.active_preview_tokens += 1;
                acc.active_preview_targets += snapshot.items.len();
                acc
            })
    }
}

fn sweep(snapshots: &mut HashMap<String, PreviewSnapshot>, now: DateTime<Utc>) {
    snapshots.retain(|_, snapshot| !snapshot.is_expired(now));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntityType;

    fn entities() -> Vec<EntityItem> {
        vec![EntityItem::new("1", EntityType::Friend, "A").with_access_hash("2")]
    }

    #[test]
    fn creates_and_consumes_a_preview_token() {
        let store = PreviewStore::default();
        let preview = store.create(BatchAction::DeleteFriends, entities(), vec![]);
        assert_eq!(preview.total, 1);
        assert_eq!(preview.items[0].id, "1");
        assert!(preview.expires_at > Utc::now());

        let consumed = store
            .consume(&preview.preview_token, BatchAction::DeleteFriends)
            .unwrap();
        assert_eq!(consumed.len(), 1);

        assert_eq!(
            store.consume(&preview.preview_token, BatchAction::DeleteFriends),
            Err(PreviewError::TokenInvalid)
        );
    }

    #[test]
    fn action_mismatch_keeps_snapshot() {
        let store = PreviewStore::default();
        let preview = store.create(BatchAction::DeleteFriends, entities(), vec![]);

        assert_eq!(
            store.consume(&preview.preview_token, BatchAction::LeaveGroups),
            Err(PreviewError::ActionMismatch)
        );
        assert!(store.get(&preview.preview_token).is_some());

        let items = store
            .consume(&preview.preview_token, BatchAction::DeleteFriends)
            .unwrap();
        assert_eq!(items, entities());
    }

    #[test]
    fn unknown_token_is_invalid() {
        let store = PreviewStore::default();
        assert_eq!(
            store.consume("nope", BatchAction::LeaveGroups),
            Err(PreviewError::TokenInvalid)
        );
        assert!(store.get("nope").is_none());
    }

    #[test]
    fn expired_entries_are_absent_everywhere() {
        let store = PreviewStore::new(Duration::ZERO);
        let preview = store.create(BatchAction::DeleteFriends, entities(), vec![]);

        assert!(store.get(&preview.preview_token).is_none());
        assert_eq!(store.stats(), PreviewStats::default());
        assert_eq!(
            store.consume(&preview.preview_token, BatchAction::DeleteFriends),
            Err(PreviewError::TokenInvalid)
        );
    }

    #[test]
    fn get_does_not_consume() {
        let store = PreviewStore::default();
        let preview = store.create(
            BatchAction::DeleteFriends,
            entities(),
            vec!["skipped x".into()],
        );
        let snapshot = store.get(&preview.preview_token).unwrap();
        assert_eq!(snapshot.warnings, vec!["skipped x".to_string()]);
        assert!(store
            .consume(&preview.preview_token, BatchAction::DeleteFriends)
            .is_ok());
    }

    #[test]
    fn stats_count_live_tokens_and_targets() {
        let store = PreviewStore::default();
        store.create(BatchAction::DeleteFriends, entities(), vec![]);
        let mut two = entities();
        two.push(EntityItem::new("3", EntityType::Friend, "B"));
        store.create(BatchAction::DeleteFriends, two, vec![]);

        let stats = store.stats();
        assert_eq!(stats.active_preview_tokens, 2);
        assert_eq!(stats.active_preview_targets, 3);
    }
}
