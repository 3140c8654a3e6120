use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::relations::FollowEdge;
use crate::store::{RelationshipStore, StoreResult};

pub const DEFAULT_BLOCK_CACHE_TTL: Duration = Duration::from_secs(60);

struct BlockCacheEntry {
    blocked: HashSet<Uuid>,
    expires_at: Instant,
}

/// Access decisions for the relationship graph.
///
/// Owns an explicit read-through cache of each user's block set with a TTL,
/// so block lookups on the hot follow path avoid a storage round trip and
/// invalidation on block/unblock is a visible, testable step rather than an
/// ambient cache call.
pub struct AccessPolicy {
    store: Arc<dyn RelationshipStore>,
    ttl: Duration,
    cache: Mutex<HashMap<Uuid, BlockCacheEntry>>,
}

impl AccessPolicy {
    pub fn new(store: Arc<dyn RelationshipStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Whether following this target needs the target's approval.
    pub fn requires_approval(&self, target_is_private: bool) -> bool {
        target_is_private
    }

    /// Only the user the request was sent to may accept or reject it.
    pub fn can_act_on_request(&self, actor_id: Uuid, edge: &FollowEdge) -> bool {
        actor_id == edge.followed_id
    }

    /// A follow list is visible to its owner, to anyone when the owner is
    /// public, and to approved followers otherwise.
    pub async fn can_view_follow_list(
        &self,
        viewer_id: Uuid,
        target_id: Uuid,
        target_is_private: bool,
    ) -> StoreResult<bool> {
        if viewer_id == target_id || !target_is_private {
            return Ok(true);
        }
        self.store.has_approved_edge(viewer_id, target_id).await
    }

    /// Whether a block exists between the two users in either direction,
    /// served from the cache when fresh.
    pub async fn is_blocked(&self, actor_id: Uuid, other_id: Uuid) -> StoreResult<bool> {
        if let Some(blocked) = self.cached_lookup(actor_id, other_id) {
            return Ok(blocked);
        }

        let ids = self.store.blocked_user_ids(actor_id).await?;
        let blocked = ids.contains(&other_id);

        let mut cache = self.cache.lock().expect("block cache lock");
        cache.insert(
            actor_id,
            BlockCacheEntry {
                blocked: ids.into_iter().collect(),
                expires_at: Instant::now() + self.ttl,
            },
        );

        Ok(blocked)
    }

    /// Drops the user's cached block set. Called on every block/unblock so
    /// the next check reads through to storage.
    pub fn invalidate(&self, user_id: Uuid) {
        let mut cache = self.cache.lock().expect("block cache lock");
        cache.remove(&user_id);
    }

    fn cached_lookup(&self, actor_id: Uuid, other_id: Uuid) -> Option<bool> {
        let mut cache = self.cache.lock().expect("block cache lock");
        let expired = match cache.get(&actor_id) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Some(entry.blocked.contains(&other_id));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            cache.remove(&actor_id);
        }
        None
    }
}
