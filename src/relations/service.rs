use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::error::{RelationError, RelationResult};
use crate::events::{EventPublisher, RelationEvent};
use crate::policy::{AccessPolicy, DEFAULT_BLOCK_CACHE_TTL};
use crate::relations::{
    BlockOutcome, CounterField, FollowDirection, FollowEdge, FollowOutcome, FollowStatus,
    RequestAction, RequestDirection, RequestOutcome, UnfollowOutcome, UserCounters,
};
use crate::store::{CounterStore, RelationshipStore, UserDirectory};

/// Orchestrates the follow/block state machine over the storage ports.
///
/// The service owns no persisted state. Edge mutations are single atomic
/// store operations and are the source of truth; counter and event writes
/// happen after the edge write commits and are best-effort. A counter or
/// publish failure never rolls back an edge mutation or fails the call.
pub struct RelationshipService {
    relationships: Arc<dyn RelationshipStore>,
    counters: Arc<dyn CounterStore>,
    users: Arc<dyn UserDirectory>,
    events: Arc<dyn EventPublisher>,
    policy: AccessPolicy,
}

impl RelationshipService {
    pub fn new(
        relationships: Arc<dyn RelationshipStore>,
        counters: Arc<dyn CounterStore>,
        users: Arc<dyn UserDirectory>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self::with_block_cache_ttl(
            relationships,
            counters,
            users,
            events,
            DEFAULT_BLOCK_CACHE_TTL,
        )
    }

    pub fn with_block_cache_ttl(
        relationships: Arc<dyn RelationshipStore>,
        counters: Arc<dyn CounterStore>,
        users: Arc<dyn UserDirectory>,
        events: Arc<dyn EventPublisher>,
        block_cache_ttl: Duration,
    ) -> Self {
        let policy = AccessPolicy::new(relationships.clone(), block_cache_ttl);
        Self {
            relationships,
            counters,
            users,
            events,
            policy,
        }
    }

    /// Follow a user, or request to when the target is private.
    ///
    /// Safe to retry: a repeated attempt reports the current state without
    /// mutating anything, and of N concurrent attempts exactly one observes
    /// the transition (and settles counters).
    #[tracing::instrument(skip(self))]
    pub async fn follow_user(
        &self,
        actor_id: Uuid,
        target_id: Uuid,
    ) -> RelationResult<FollowOutcome> {
        if actor_id == target_id {
            return Err(RelationError::SelfOperationNotAllowed);
        }
        let Some(target_is_private) = self.users.is_private(target_id).await? else {
            return Err(RelationError::EntityNotFound("user"));
        };
        if self.policy.is_blocked(actor_id, target_id).await? {
            return Err(RelationError::AccessDenied(
                "a block exists between these users",
            ));
        }

        match self.relationships.find_edge(actor_id, target_id).await? {
            Some(edge) if edge.is_live(FollowStatus::Approved) => {
                return Ok(FollowOutcome {
                    status: FollowStatus::Approved,
                    message: "already_following",
                });
            }
            Some(edge) if edge.is_live(FollowStatus::Pending) => {
                return Ok(FollowOutcome {
                    status: FollowStatus::Pending,
                    message: "pending",
                });
            }
            // No edge, a rejected edge, or a soft-deleted edge: all take the
            // same single conditional write, which revives or creates the
            // row.
            _ => {}
        }

        let status = if self.policy.requires_approval(target_is_private) {
            FollowStatus::Pending
        } else {
            FollowStatus::Approved
        };

        let Some(edge) = self
            .relationships
            .upsert_edge(actor_id, target_id, status)
            .await?
        else {
            // A concurrent caller already moved the edge to this status.
            let message = match status {
                FollowStatus::Approved => "already_following",
                _ => "pending",
            };
            return Ok(FollowOutcome { status, message });
        };

        if edge.status == FollowStatus::Approved {
            self.settle_approved(actor_id, target_id, true).await;
            self.emit(RelationEvent::UserFollowed {
                follower_id: actor_id,
                followed_id: target_id,
            })
            .await;
            Ok(FollowOutcome {
                status: FollowStatus::Approved,
                message: "now_following",
            })
        } else {
            Ok(FollowOutcome {
                status: FollowStatus::Pending,
                message: "follow_request_sent",
            })
        }
    }

    /// Remove a live follow edge (soft delete). A no-op success when the
    /// actor is not following the target.
    #[tracing::instrument(skip(self))]
    pub async fn unfollow_user(
        &self,
        actor_id: Uuid,
        target_id: Uuid,
    ) -> RelationResult<UnfollowOutcome> {
        let Some(edge) = self
            .relationships
            .soft_delete_edge(actor_id, target_id)
            .await?
        else {
            return Ok(UnfollowOutcome {
                unfollowed: false,
                message: "not_following",
            });
        };

        if edge.status == FollowStatus::Approved {
            self.settle_approved(actor_id, target_id, false).await;
        }
        self.emit(RelationEvent::UserUnfollowed {
            follower_id: actor_id,
            followed_id: target_id,
        })
        .await;

        Ok(UnfollowOutcome {
            unfollowed: true,
            message: "unfollowed",
        })
    }

    /// Accept or reject a pending follow request. Only the user the request
    /// was sent to may act on it.
    #[tracing::instrument(skip(self))]
    pub async fn handle_follow_request(
        &self,
        actor_id: Uuid,
        request_id: Uuid,
        action: RequestAction,
    ) -> RelationResult<RequestOutcome> {
        let Some(edge) = self.relationships.find_edge_by_id(request_id).await? else {
            return Err(RelationError::EntityNotFound("follow request"));
        };
        if !self.policy.can_act_on_request(actor_id, &edge) {
            return Err(RelationError::AccessDenied(
                "only the recipient may act on a follow request",
            ));
        }

        let status = match action {
            RequestAction::Accept => FollowStatus::Approved,
            RequestAction::Reject => FollowStatus::Rejected,
        };

        // Compare-and-swap on the pending status; a request resolved by a
        // concurrent call (or already deleted) no longer exists here.
        let Some(edge) = self
            .relationships
            .resolve_pending_edge(edge.id, status)
            .await?
        else {
            return Err(RelationError::EntityNotFound("follow request"));
        };

        match action {
            RequestAction::Accept => {
                self.settle_approved(edge.follower_id, edge.followed_id, true)
                    .await;
                self.emit(RelationEvent::UserFollowed {
                    follower_id: edge.follower_id,
                    followed_id: edge.followed_id,
                })
                .await;
                Ok(RequestOutcome {
                    status: FollowStatus::Approved,
                    message: "follow_request_accepted",
                })
            }
            RequestAction::Reject => Ok(RequestOutcome {
                status: FollowStatus::Rejected,
                message: "follow_request_rejected",
            }),
        }
    }

    /// Block a user: records the block, then severs any follow edge between
    /// the two, settling counters for edges that were approved.
    #[tracing::instrument(skip(self))]
    pub async fn block_user(
        &self,
        actor_id: Uuid,
        target_id: Uuid,
        reason: Option<String>,
    ) -> RelationResult<BlockOutcome> {
        if actor_id == target_id {
            return Err(RelationError::SelfOperationNotAllowed);
        }
        if !self.users.exists(target_id).await? {
            return Err(RelationError::EntityNotFound("user"));
        }

        let Some(_block) = self
            .relationships
            .create_block(actor_id, target_id, reason)
            .await?
        else {
            return Ok(BlockOutcome {
                success: false,
                message: "already_blocked",
            });
        };

        let removed = self
            .relationships
            .remove_edges_between(actor_id, target_id)
            .await?;
        for edge in &removed {
            if edge.status == FollowStatus::Approved {
                self.settle_approved(edge.follower_id, edge.followed_id, false)
                    .await;
            }
        }

        self.policy.invalidate(actor_id);
        self.policy.invalidate(target_id);
        self.emit(RelationEvent::UserBlocked {
            blocker_id: actor_id,
            blocked_id: target_id,
        })
        .await;

        Ok(BlockOutcome {
            success: true,
            message: "blocked",
        })
    }

    /// Remove a block. Follow edges severed by the block stay deleted; the
    /// users start from a clean slate.
    #[tracing::instrument(skip(self))]
    pub async fn unblock_user(
        &self,
        actor_id: Uuid,
        target_id: Uuid,
    ) -> RelationResult<BlockOutcome> {
        if actor_id == target_id {
            return Err(RelationError::SelfOperationNotAllowed);
        }

        let removed = self.relationships.remove_block(actor_id, target_id).await?;
        self.policy.invalidate(actor_id);
        self.policy.invalidate(target_id);

        Ok(if removed {
            BlockOutcome {
                success: true,
                message: "unblocked",
            }
        } else {
            BlockOutcome {
                success: false,
                message: "not_blocked",
            }
        })
    }

    /// Ids of a user's followers or followees. Private targets only expose
    /// their lists to themselves and to approved followers; viewers other
    /// than the owner are always served approved edges regardless of the
    /// requested status filter.
    #[tracing::instrument(skip(self))]
    pub async fn get_user_follows(
        &self,
        actor_id: Uuid,
        target_user_id: Uuid,
        direction: FollowDirection,
        status: Option<FollowStatus>,
    ) -> RelationResult<Vec<Uuid>> {
        let Some(target_is_private) = self.users.is_private(target_user_id).await? else {
            return Err(RelationError::EntityNotFound("user"));
        };
        if !self
            .policy
            .can_view_follow_list(actor_id, target_user_id, target_is_private)
            .await?
        {
            return Err(RelationError::AccessDenied("this follow list is private"));
        }

        let status = if actor_id == target_user_id {
            status
        } else {
            Some(FollowStatus::Approved)
        };

        let edges = self
            .relationships
            .list_follows(target_user_id, direction, status)
            .await?;
        Ok(edges
            .into_iter()
            .map(|edge| match direction {
                FollowDirection::Followers => edge.follower_id,
                FollowDirection::Following => edge.followed_id,
            })
            .collect())
    }

    /// Pending follow requests the actor received, or ones they sent.
    #[tracing::instrument(skip(self))]
    pub async fn get_pending_requests(
        &self,
        actor_id: Uuid,
        direction: RequestDirection,
    ) -> RelationResult<Vec<FollowEdge>> {
        let side = match direction {
            RequestDirection::Received => FollowDirection::Followers,
            RequestDirection::Sent => FollowDirection::Following,
        };
        Ok(self
            .relationships
            .list_follows(actor_id, side, Some(FollowStatus::Pending))
            .await?)
    }

    /// Whether the viewer has an approved follow edge to the target.
    pub async fn is_following(&self, viewer_id: Uuid, target_id: Uuid) -> RelationResult<bool> {
        Ok(self
            .relationships
            .has_approved_edge(viewer_id, target_id)
            .await?)
    }

    /// The user's counters, materialized from the edge table on first read.
    pub async fn get_counters(&self, user_id: Uuid) -> RelationResult<UserCounters> {
        if !self.users.exists(user_id).await? {
            return Err(RelationError::EntityNotFound("user"));
        }
        Ok(self.counters.get_or_initialize(user_id).await?)
    }

    /// Settles both counters for an approved edge transition. Best effort:
    /// the edge write already committed, so failures are logged and left to
    /// reconciliation.
    async fn settle_approved(&self, follower_id: Uuid, followed_id: Uuid, gained: bool) {
        let results = if gained {
            [
                (
                    follower_id,
                    self.counters
                        .increment(follower_id, CounterField::Following)
                        .await,
                ),
                (
                    followed_id,
                    self.counters
                        .increment(followed_id, CounterField::Followers)
                        .await,
                ),
            ]
        } else {
            [
                (
                    follower_id,
                    self.counters
                        .decrement_clamped(follower_id, CounterField::Following)
                        .await,
                ),
                (
                    followed_id,
                    self.counters
                        .decrement_clamped(followed_id, CounterField::Followers)
                        .await,
                ),
            ]
        };
        for (user_id, result) in results {
            if let Err(error) = result {
                tracing::warn!(%user_id, %error, "counter update failed; awaiting reconciliation");
            }
        }
    }

    async fn emit(&self, event: RelationEvent) {
        if let Err(error) = self.events.publish(&event).await {
            tracing::warn!(event = event.name(), %error, "failed to publish relation event");
        }
    }
}
