use serde::{Deserialize, Serialize};
use sqlx::prelude::Type;
use uuid::Uuid;

pub mod reconcile;
pub mod service;

/// Database model for a directed follow edge between two users.
///
/// There is at most one row per ordered (follower, followed) pair; unfollow
/// marks the row with `deleted_at` and a later re-follow revives it, keeping
/// the edge id stable.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FollowEdge {
    pub id: Uuid,
    pub follower_id: Uuid,
    pub followed_id: Uuid,
    pub status: FollowStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub deleted_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl FollowEdge {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_live(&self, status: FollowStatus) -> bool {
        self.deleted_at.is_none() && self.status == status
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[sqlx(type_name = "follow_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FollowStatus {
    Pending,
    Approved,
    Rejected,
}

/// Database model for a block between two users.
/// A block in either direction forbids new follow edges for the pair.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BlockEdge {
    pub id: Uuid,
    pub blocker_id: Uuid,
    pub blocked_id: Uuid,
    pub reason: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Denormalized follower/following counts for one user.
///
/// A best-effort cache over the edge table: it may drift transiently and is
/// corrected by reconciliation, but never goes negative.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserCounters {
    pub user_id: Uuid,
    pub follower_count: i64,
    pub following_count: i64,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl UserCounters {
    pub fn new(user_id: Uuid, follower_count: i64, following_count: i64) -> Self {
        Self {
            user_id,
            follower_count,
            following_count,
            updated_at: chrono::Utc::now(),
        }
    }
}

/// Which aggregate a counter mutation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterField {
    Followers,
    Following,
}

/// Side of the graph a follow list is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowDirection {
    Followers,
    Following,
}

/// Whether a pending-request listing is for requests the actor received or
/// ones they sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestDirection {
    Received,
    Sent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestAction {
    Accept,
    Reject,
}

/// Result of a follow attempt.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct FollowOutcome {
    pub status: FollowStatus,
    pub message: &'static str,
}

/// Result of an unfollow attempt. `unfollowed` is false when there was no
/// live edge to remove (idempotent no-op).
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct UnfollowOutcome {
    pub unfollowed: bool,
    pub message: &'static str,
}

/// Result of acting on a pending follow request.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct RequestOutcome {
    pub status: FollowStatus,
    pub message: &'static str,
}

/// Result of a block or unblock attempt.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct BlockOutcome {
    pub success: bool,
    pub message: &'static str,
}
