use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::relations::{
    BlockEdge, CounterField, FollowDirection, FollowEdge, FollowStatus, UserCounters,
};
use crate::store::{
    CounterStore, RelationshipStore, StoreResult, UserDirectory,
};

/// Shared in-memory graph state. The relationship and counter stores hold
/// the same `Arc` so counter bootstrap/reconciliation can recompute true
/// counts from the edges.
#[derive(Default)]
struct GraphState {
    edges: HashMap<(Uuid, Uuid), FollowEdge>,
    blocks: HashMap<(Uuid, Uuid), BlockEdge>,
    counters: HashMap<Uuid, UserCounters>,
}

impl GraphState {
    fn approved_counts(&self, user_id: Uuid) -> (i64, i64) {
        let live_approved = |edge: &&FollowEdge| {
            edge.deleted_at.is_none() && edge.status == FollowStatus::Approved
        };
        let followers = self
            .edges
            .values()
            .filter(live_approved)
            .filter(|edge| edge.followed_id == user_id)
            .count() as i64;
        let following = self
            .edges
            .values()
            .filter(live_approved)
            .filter(|edge| edge.follower_id == user_id)
            .count() as i64;
        (followers, following)
    }
}

/// In-memory edge store. Every mutation holds the write guard across the
/// whole check-and-write, so concurrent callers see the same atomicity the
/// SQL implementation gets from single conditional statements.
#[derive(Clone, Default)]
pub struct MemoryRelationshipStore {
    inner: Arc<RwLock<GraphState>>,
}

/// In-memory counter store sharing state with a [`MemoryRelationshipStore`].
#[derive(Clone)]
pub struct MemoryCounterStore {
    inner: Arc<RwLock<GraphState>>,
}

/// Builds a relationship/counter store pair over one shared graph.
pub fn memory_stores() -> (Arc<MemoryRelationshipStore>, Arc<MemoryCounterStore>) {
    let relationships = Arc::new(MemoryRelationshipStore::default());
    let counters = Arc::new(MemoryCounterStore {
        inner: relationships.inner.clone(),
    });
    (relationships, counters)
}

#[async_trait]
impl RelationshipStore for MemoryRelationshipStore {
    async fn find_edge(
        &self,
        follower_id: Uuid,
        followed_id: Uuid,
    ) -> StoreResult<Option<FollowEdge>> {
        let state = self.inner.read().await;
        Ok(state.edges.get(&(follower_id, followed_id)).cloned())
    }

    async fn find_edge_by_id(&self, id: Uuid) -> StoreResult<Option<FollowEdge>> {
        let state = self.inner.read().await;
        Ok(state.edges.values().find(|edge| edge.id == id).cloned())
    }

    async fn upsert_edge(
        &self,
        follower_id: Uuid,
        followed_id: Uuid,
        status: FollowStatus,
    ) -> StoreResult<Option<FollowEdge>> {
        let mut state = self.inner.write().await;
        let now = Utc::now();
        if let Some(edge) = state.edges.get_mut(&(follower_id, followed_id)) {
            if edge.is_live(status) {
                return Ok(None);
            }
            edge.status = status;
            edge.deleted_at = None;
            edge.updated_at = now;
            return Ok(Some(edge.clone()));
        }

        let edge = FollowEdge {
            id: Uuid::new_v4(),
            follower_id,
            followed_id,
            status,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        state.edges.insert((follower_id, followed_id), edge.clone());
        Ok(Some(edge))
    }

    async fn resolve_pending_edge(
        &self,
        id: Uuid,
        status: FollowStatus,
    ) -> StoreResult<Option<FollowEdge>> {
        let mut state = self.inner.write().await;
        let edge = state.edges.values_mut().find(|edge| {
            edge.id == id && edge.deleted_at.is_none() && edge.status == FollowStatus::Pending
        });
        Ok(edge.map(|edge| {
            edge.status = status;
            edge.updated_at = Utc::now();
            edge.clone()
        }))
    }

    async fn soft_delete_edge(
        &self,
        follower_id: Uuid,
        followed_id: Uuid,
    ) -> StoreResult<Option<FollowEdge>> {
        let mut state = self.inner.write().await;
        let edge = state
            .edges
            .get_mut(&(follower_id, followed_id))
            .filter(|edge| edge.deleted_at.is_none());
        Ok(edge.map(|edge| {
            let now = Utc::now();
            edge.deleted_at = Some(now);
            edge.updated_at = now;
            edge.clone()
        }))
    }

    async fn has_approved_edge(&self, follower_id: Uuid, followed_id: Uuid) -> StoreResult<bool> {
        let state = self.inner.read().await;
        Ok(state
            .edges
            .get(&(follower_id, followed_id))
            .is_some_and(|edge| edge.is_live(FollowStatus::Approved)))
    }

    async fn list_follows(
        &self,
        user_id: Uuid,
        direction: FollowDirection,
        status: Option<FollowStatus>,
    ) -> StoreResult<Vec<FollowEdge>> {
        let state = self.inner.read().await;
        let mut edges: Vec<FollowEdge> = state
            .edges
            .values()
            .filter(|edge| edge.deleted_at.is_none())
            .filter(|edge| match direction {
                FollowDirection::Followers => edge.followed_id == user_id,
                FollowDirection::Following => edge.follower_id == user_id,
            })
            .filter(|edge| status.map_or(true, |status| edge.status == status))
            .cloned()
            .collect();
        edges.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(edges)
    }

    async fn create_block(
        &self,
        blocker_id: Uuid,
        blocked_id: Uuid,
        reason: Option<String>,
    ) -> StoreResult<Option<BlockEdge>> {
        let mut state = self.inner.write().await;
        if state.blocks.contains_key(&(blocker_id, blocked_id)) {
            return Ok(None);
        }
        let block = BlockEdge {
            id: Uuid::new_v4(),
            blocker_id,
            blocked_id,
            reason,
            created_at: Utc::now(),
        };
        state.blocks.insert((blocker_id, blocked_id), block.clone());
        Ok(Some(block))
    }

    async fn remove_block(&self, blocker_id: Uuid, blocked_id: Uuid) -> StoreResult<bool> {
        let mut state = self.inner.write().await;
        Ok(state.blocks.remove(&(blocker_id, blocked_id)).is_some())
    }

    async fn is_blocked(&self, a: Uuid, b: Uuid) -> StoreResult<bool> {
        let state = self.inner.read().await;
        Ok(state.blocks.contains_key(&(a, b)) || state.blocks.contains_key(&(b, a)))
    }

    async fn blocked_user_ids(&self, user_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let state = self.inner.read().await;
        Ok(state
            .blocks
            .values()
            .filter_map(|block| {
                if block.blocker_id == user_id {
                    Some(block.blocked_id)
                } else if block.blocked_id == user_id {
                    Some(block.blocker_id)
                } else {
                    None
                }
            })
            .collect())
    }

    async fn remove_edges_between(&self, a: Uuid, b: Uuid) -> StoreResult<Vec<FollowEdge>> {
        let mut state = self.inner.write().await;
        let now = Utc::now();
        let mut removed = Vec::new();
        for key in [(a, b), (b, a)] {
            if let Some(edge) = state
                .edges
                .get_mut(&key)
                .filter(|edge| edge.deleted_at.is_none())
            {
                edge.deleted_at = Some(now);
                edge.updated_at = now;
                removed.push(edge.clone());
            }
        }
        Ok(removed)
    }

    async fn approved_counts(&self, user_id: Uuid) -> StoreResult<(i64, i64)> {
        let state = self.inner.read().await;
        Ok(state.approved_counts(user_id))
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, user_id: Uuid, field: CounterField) -> StoreResult<()> {
        let mut state = self.inner.write().await;
        let counters = state
            .counters
            .entry(user_id)
            .or_insert_with(|| UserCounters::new(user_id, 0, 0));
        match field {
            CounterField::Followers => counters.follower_count += 1,
            CounterField::Following => counters.following_count += 1,
        }
        counters.updated_at = Utc::now();
        Ok(())
    }

    async fn decrement_clamped(&self, user_id: Uuid, field: CounterField) -> StoreResult<()> {
        let mut state = self.inner.write().await;
        if let Some(counters) = state.counters.get_mut(&user_id) {
            match field {
                CounterField::Followers => {
                    counters.follower_count = (counters.follower_count - 1).max(0);
                }
                CounterField::Following => {
                    counters.following_count = (counters.following_count - 1).max(0);
                }
            }
            counters.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn get_or_initialize(&self, user_id: Uuid) -> StoreResult<UserCounters> {
        let mut state = self.inner.write().await;
        if let Some(counters) = state.counters.get(&user_id) {
            return Ok(counters.clone());
        }
        let (followers, following) = state.approved_counts(user_id);
        let counters = UserCounters::new(user_id, followers, following);
        state.counters.insert(user_id, counters.clone());
        Ok(counters)
    }

    async fn reconcile(&self, user_id: Uuid) -> StoreResult<UserCounters> {
        let mut state = self.inner.write().await;
        let (followers, following) = state.approved_counts(user_id);
        let counters = UserCounters::new(user_id, followers, following);
        state.counters.insert(user_id, counters.clone());
        Ok(counters)
    }
}

/// In-memory user directory seeded with (id, is_private) pairs.
#[derive(Default)]
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<Uuid, bool>>,
}

impl MemoryUserDirectory {
    pub async fn insert_user(&self, id: Uuid, is_private: bool) {
        self.users.write().await.insert(id, is_private);
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn exists(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.users.read().await.contains_key(&id))
    }

    async fn is_private(&self, id: Uuid) -> StoreResult<Option<bool>> {
        Ok(self.users.read().await.get(&id).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_creates_then_reports_no_change_for_same_status() {
        let (store, _) = memory_stores();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let created = store
            .upsert_edge(a, b, FollowStatus::Approved)
            .await
            .unwrap();
        assert!(created.is_some());

        let repeat = store
            .upsert_edge(a, b, FollowStatus::Approved)
            .await
            .unwrap();
        assert!(repeat.is_none());
    }

    #[tokio::test]
    async fn soft_deleted_edge_is_revived_with_the_same_id() {
        let (store, _) = memory_stores();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let original = store
            .upsert_edge(a, b, FollowStatus::Approved)
            .await
            .unwrap()
            .unwrap();
        store.soft_delete_edge(a, b).await.unwrap().unwrap();

        let found = store.find_edge(a, b).await.unwrap().unwrap();
        assert!(found.is_deleted());

        let revived = store
            .upsert_edge(a, b, FollowStatus::Pending)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(revived.id, original.id);
        assert!(!revived.is_deleted());
        assert_eq!(revived.status, FollowStatus::Pending);
    }

    #[tokio::test]
    async fn soft_delete_without_live_edge_is_a_noop() {
        let (store, _) = memory_stores();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(store.soft_delete_edge(a, b).await.unwrap().is_none());

        store
            .upsert_edge(a, b, FollowStatus::Approved)
            .await
            .unwrap();
        store.soft_delete_edge(a, b).await.unwrap().unwrap();
        assert!(store.soft_delete_edge(a, b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn resolve_pending_only_touches_live_pending_edges() {
        let (store, _) = memory_stores();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let edge = store
            .upsert_edge(a, b, FollowStatus::Pending)
            .await
            .unwrap()
            .unwrap();

        let approved = store
            .resolve_pending_edge(edge.id, FollowStatus::Approved)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(approved.status, FollowStatus::Approved);

        // A second resolution attempt finds nothing pending.
        let again = store
            .resolve_pending_edge(edge.id, FollowStatus::Approved)
            .await
            .unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn decrement_clamps_at_zero() {
        let (relationships, counters) = memory_stores();
        let user = Uuid::new_v4();
        drop(relationships);

        counters
            .decrement_clamped(user, CounterField::Followers)
            .await
            .unwrap();
        counters.increment(user, CounterField::Followers).await.unwrap();
        counters
            .decrement_clamped(user, CounterField::Followers)
            .await
            .unwrap();
        counters
            .decrement_clamped(user, CounterField::Followers)
            .await
            .unwrap();

        let row = counters.get_or_initialize(user).await.unwrap();
        assert_eq!(row.follower_count, 0);
    }

    #[tokio::test]
    async fn get_or_initialize_bootstraps_from_the_edge_table() {
        let (relationships, counters) = memory_stores();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        relationships
            .upsert_edge(a, c, FollowStatus::Approved)
            .await
            .unwrap();
        relationships
            .upsert_edge(b, c, FollowStatus::Approved)
            .await
            .unwrap();
        relationships
            .upsert_edge(c, a, FollowStatus::Pending)
            .await
            .unwrap();

        let row = counters.get_or_initialize(c).await.unwrap();
        assert_eq!(row.follower_count, 2);
        // Pending edges do not count.
        assert_eq!(row.following_count, 0);
    }
}
