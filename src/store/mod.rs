use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::relations::{
    BlockEdge, CounterField, FollowDirection, FollowEdge, FollowStatus, UserCounters,
};

pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable storage for follow and block edges; the only layer that touches
/// the physical representation of the graph.
///
/// Every mutation is a single atomic storage operation. Concurrent callers
/// must converge on one edge per ordered pair without the caller holding any
/// lock, so the conditional writes below never decompose into a read
/// followed by a write.
#[async_trait]
pub trait RelationshipStore: Send + Sync {
    /// Returns the live edge for the pair if one exists, otherwise the most
    /// recent soft-deleted edge, otherwise `None`. Callers distinguish the
    /// two via `deleted_at`.
    async fn find_edge(
        &self,
        follower_id: Uuid,
        followed_id: Uuid,
    ) -> StoreResult<Option<FollowEdge>>;

    async fn find_edge_by_id(&self, id: Uuid) -> StoreResult<Option<FollowEdge>>;

    /// Single conditional write: inserts the edge, or revives/updates the
    /// existing row for the pair, clearing `deleted_at`.
    ///
    /// Returns `None` when a live edge already carries the requested status,
    /// so that exactly one of any set of concurrent callers observes the
    /// transition.
    async fn upsert_edge(
        &self,
        follower_id: Uuid,
        followed_id: Uuid,
        status: FollowStatus,
    ) -> StoreResult<Option<FollowEdge>>;

    /// Compare-and-swap on `status = pending`: resolves the request to the
    /// given status and returns the updated edge, or `None` when the edge is
    /// no longer a live pending request.
    async fn resolve_pending_edge(
        &self,
        id: Uuid,
        status: FollowStatus,
    ) -> StoreResult<Option<FollowEdge>>;

    /// Marks the live edge for the pair deleted, returning it as it stood.
    /// Succeeds with `None` when no live edge exists.
    async fn soft_delete_edge(
        &self,
        follower_id: Uuid,
        followed_id: Uuid,
    ) -> StoreResult<Option<FollowEdge>>;

    async fn has_approved_edge(&self, follower_id: Uuid, followed_id: Uuid) -> StoreResult<bool>;

    /// Live edges where the user is the followed side (`Followers`) or the
    /// follower side (`Following`), newest first.
    async fn list_follows(
        &self,
        user_id: Uuid,
        direction: FollowDirection,
        status: Option<FollowStatus>,
    ) -> StoreResult<Vec<FollowEdge>>;

    /// Records a block. Returns `None` when the actor already blocks the
    /// target (idempotent, nothing written).
    async fn create_block(
        &self,
        blocker_id: Uuid,
        blocked_id: Uuid,
        reason: Option<String>,
    ) -> StoreResult<Option<BlockEdge>>;

    /// Removes a block; returns whether one existed.
    async fn remove_block(&self, blocker_id: Uuid, blocked_id: Uuid) -> StoreResult<bool>;

    /// Whether a block exists between the two users, in either direction.
    async fn is_blocked(&self, a: Uuid, b: Uuid) -> StoreResult<bool>;

    /// Ids of everyone this user has blocked or been blocked by; feeds the
    /// policy's block cache.
    async fn blocked_user_ids(&self, user_id: Uuid) -> StoreResult<Vec<Uuid>>;

    /// Soft-deletes any live edge in either direction between the two users,
    /// returning the removed edges so the caller can settle counters.
    async fn remove_edges_between(&self, a: Uuid, b: Uuid) -> StoreResult<Vec<FollowEdge>>;

    /// True (follower, following) counts of approved live edges, recomputed
    /// from the graph.
    async fn approved_counts(&self, user_id: Uuid) -> StoreResult<(i64, i64)>;
}

/// Durable storage for the per-user aggregate counters.
///
/// Increments and decrements are single atomic arithmetic updates, never a
/// read-modify-write round trip from the caller.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn increment(&self, user_id: Uuid, field: CounterField) -> StoreResult<()>;

    /// Atomic `GREATEST(0, x - 1)`; a counter never goes negative no matter
    /// how often callers retry.
    async fn decrement_clamped(&self, user_id: Uuid, field: CounterField) -> StoreResult<()>;

    /// Reads the counters, computing and persisting them from the edge
    /// store on first access (lazy bootstrap).
    async fn get_or_initialize(&self, user_id: Uuid) -> StoreResult<UserCounters>;

    /// Recomputes both counters from the edge store and overwrites the
    /// stored values.
    async fn reconcile(&self, user_id: Uuid) -> StoreResult<UserCounters>;
}

/// External user store. Only existence and the privacy flag are consulted
/// here; accounts are owned elsewhere.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn exists(&self, id: Uuid) -> StoreResult<bool>;

    /// `None` when the user does not exist.
    async fn is_private(&self, id: Uuid) -> StoreResult<Option<bool>>;
}
