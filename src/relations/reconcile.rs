use std::sync::Arc;

use uuid::Uuid;

use crate::store::CounterStore;

/// Outcome of one reconciliation sweep.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub scanned: usize,
    pub repaired: usize,
}

/// Recomputes stored counters from the edge table, repairing the drift that
/// best-effort counter writes are allowed to leave behind.
pub struct Reconciler {
    counters: Arc<dyn CounterStore>,
}

impl Reconciler {
    pub fn new(counters: Arc<dyn CounterStore>) -> Self {
        Self { counters }
    }

    /// Reconciles each user in turn. Per-user failures are logged and do not
    /// abort the sweep.
    #[tracing::instrument(skip_all, fields(users = user_ids.len()))]
    pub async fn sweep(&self, user_ids: &[Uuid]) -> SweepSummary {
        let mut repaired = 0;
        for &user_id in user_ids {
            let before = match self.counters.get_or_initialize(user_id).await {
                Ok(counters) => counters,
                Err(error) => {
                    tracing::warn!(%user_id, %error, "could not read counters; skipping");
                    continue;
                }
            };
            let after = match self.counters.reconcile(user_id).await {
                Ok(counters) => counters,
                Err(error) => {
                    tracing::warn!(%user_id, %error, "could not reconcile counters");
                    continue;
                }
            };
            if before.follower_count != after.follower_count
                || before.following_count != after.following_count
            {
                repaired += 1;
                tracing::info!(
                    %user_id,
                    stale_followers = before.follower_count,
                    stale_following = before.following_count,
                    followers = after.follower_count,
                    following = after.following_count,
                    "repaired counter drift"
                );
            }
        }
        SweepSummary {
            scanned: user_ids.len(),
            repaired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relations::{CounterField, FollowStatus};
    use crate::store::memory::memory_stores;
    use crate::store::RelationshipStore;

    #[tokio::test]
    async fn sweep_restores_counters_to_the_true_edge_counts() {
        let (relationships, counters) = memory_stores();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        relationships
            .upsert_edge(a, b, FollowStatus::Approved)
            .await
            .unwrap();

        // Drift the cache away from the graph.
        for _ in 0..3 {
            counters.increment(b, CounterField::Followers).await.unwrap();
        }

        let reconciler = Reconciler::new(counters.clone());
        let summary = reconciler.sweep(&[a, b]).await;
        assert_eq!(
            summary,
            SweepSummary {
                scanned: 2,
                repaired: 1,
            }
        );

        let healed = counters.get_or_initialize(b).await.unwrap();
        assert_eq!(healed.follower_count, 1);
        assert_eq!(healed.following_count, 0);

        // A second sweep finds nothing to do.
        let summary = reconciler.sweep(&[a, b]).await;
        assert_eq!(summary.repaired, 0);
    }
}
