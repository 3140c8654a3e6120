use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::relations::{
    BlockEdge, CounterField, FollowDirection, FollowEdge, FollowStatus, UserCounters,
};
use crate::store::{
    CounterStore, RelationshipStore, StoreResult, UserDirectory,
};

fn counter_column(field: CounterField) -> &'static str {
    match field {
        CounterField::Followers => "follower_count",
        CounterField::Following => "following_count",
    }
}

/// Postgres-backed edge store. All mutations are single conditional
/// statements so concurrent writers converge without caller-side locking.
#[derive(Clone)]
pub struct PgRelationshipStore {
    pool: PgPool,
}

impl PgRelationshipStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RelationshipStore for PgRelationshipStore {
    async fn find_edge(
        &self,
        follower_id: Uuid,
        followed_id: Uuid,
    ) -> StoreResult<Option<FollowEdge>> {
        let edge = sqlx::query_as::<_, FollowEdge>(
            r#"
            SELECT id, follower_id, followed_id, status, created_at, updated_at, deleted_at
            FROM follow_edges
            WHERE follower_id = $1 AND followed_id = $2
            "#,
        )
        .bind(follower_id)
        .bind(followed_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(edge)
    }

    async fn find_edge_by_id(&self, id: Uuid) -> StoreResult<Option<FollowEdge>> {
        let edge = sqlx::query_as::<_, FollowEdge>(
            r#"
            SELECT id, follower_id, followed_id, status, created_at, updated_at, deleted_at
            FROM follow_edges
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(edge)
    }

    #[tracing::instrument(skip_all, name = "db.follow_edges.upsert")]
    async fn upsert_edge(
        &self,
        follower_id: Uuid,
        followed_id: Uuid,
        status: FollowStatus,
    ) -> StoreResult<Option<FollowEdge>> {
        // The conflict arm's WHERE makes the write conditional: when a live
        // edge already carries the requested status no row comes back, so of
        // N racing callers exactly one observes the transition.
        let edge = sqlx::query_as::<_, FollowEdge>(
            r#"
            INSERT INTO follow_edges (follower_id, followed_id, status)
            VALUES ($1, $2, $3)
            ON CONFLICT (follower_id, followed_id) DO UPDATE
            SET status = EXCLUDED.status, deleted_at = NULL, updated_at = now()
            WHERE follow_edges.deleted_at IS NOT NULL
               OR follow_edges.status IS DISTINCT FROM EXCLUDED.status
            RETURNING id, follower_id, followed_id, status, created_at, updated_at, deleted_at
            "#,
        )
        .bind(follower_id)
        .bind(followed_id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?;

        Ok(edge)
    }

    #[tracing::instrument(skip_all, name = "db.follow_edges.resolve_pending")]
    async fn resolve_pending_edge(
        &self,
        id: Uuid,
        status: FollowStatus,
    ) -> StoreResult<Option<FollowEdge>> {
        let edge = sqlx::query_as::<_, FollowEdge>(
            r#"
            UPDATE follow_edges
            SET status = $2, updated_at = now()
            WHERE id = $1 AND status = 'pending' AND deleted_at IS NULL
            RETURNING id, follower_id, followed_id, status, created_at, updated_at, deleted_at
            "#,
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?;

        Ok(edge)
    }

    #[tracing::instrument(skip_all, name = "db.follow_edges.soft_delete")]
    async fn soft_delete_edge(
        &self,
        follower_id: Uuid,
        followed_id: Uuid,
    ) -> StoreResult<Option<FollowEdge>> {
        // RETURNING reports the row's pre-existing status with deleted_at
        // freshly set; callers use the status to settle counters.
        let edge = sqlx::query_as::<_, FollowEdge>(
            r#"
            UPDATE follow_edges
            SET deleted_at = now(), updated_at = now()
            WHERE follower_id = $1 AND followed_id = $2 AND deleted_at IS NULL
            RETURNING id, follower_id, followed_id, status, created_at, updated_at, deleted_at
            "#,
        )
        .bind(follower_id)
        .bind(followed_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(edge)
    }

    async fn has_approved_edge(&self, follower_id: Uuid, followed_id: Uuid) -> StoreResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM follow_edges
                WHERE follower_id = $1 AND followed_id = $2
                  AND status = 'approved' AND deleted_at IS NULL
            )
            "#,
        )
        .bind(follower_id)
        .bind(followed_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn list_follows(
        &self,
        user_id: Uuid,
        direction: FollowDirection,
        status: Option<FollowStatus>,
    ) -> StoreResult<Vec<FollowEdge>> {
        let side = match direction {
            FollowDirection::Followers => "followed_id",
            FollowDirection::Following => "follower_id",
        };

        let mut sql = format!(
            "SELECT id, follower_id, followed_id, status, created_at, updated_at, deleted_at \
             FROM follow_edges WHERE {side} = $1 AND deleted_at IS NULL"
        );
        if status.is_some() {
            sql.push_str(" AND status = $2");
        }
        sql.push_str(" ORDER BY created_at DESC");

        let mut query = sqlx::query_as::<_, FollowEdge>(&sql).bind(user_id);
        if let Some(status) = status {
            query = query.bind(status);
        }

        Ok(query.fetch_all(&self.pool).await?)
    }

    #[tracing::instrument(skip_all, name = "db.block_edges.create")]
    async fn create_block(
        &self,
        blocker_id: Uuid,
        blocked_id: Uuid,
        reason: Option<String>,
    ) -> StoreResult<Option<BlockEdge>> {
        let block = sqlx::query_as::<_, BlockEdge>(
            r#"
            INSERT INTO block_edges (blocker_id, blocked_id, reason)
            VALUES ($1, $2, $3)
            ON CONFLICT (blocker_id, blocked_id) DO NOTHING
            RETURNING id, blocker_id, blocked_id, reason, created_at
            "#,
        )
        .bind(blocker_id)
        .bind(blocked_id)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await?;

        Ok(block)
    }

    #[tracing::instrument(skip_all, name = "db.block_edges.remove")]
    async fn remove_block(&self, blocker_id: Uuid, blocked_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            "DELETE FROM block_edges WHERE blocker_id = $1 AND blocked_id = $2",
        )
        .bind(blocker_id)
        .bind(blocked_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn is_blocked(&self, a: Uuid, b: Uuid) -> StoreResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM block_edges
                WHERE (blocker_id = $1 AND blocked_id = $2)
                   OR (blocker_id = $2 AND blocked_id = $1)
            )
            "#,
        )
        .bind(a)
        .bind(b)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn blocked_user_ids(&self, user_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT CASE WHEN blocker_id = $1 THEN blocked_id ELSE blocker_id END
            FROM block_edges
            WHERE blocker_id = $1 OR blocked_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    #[tracing::instrument(skip_all, name = "db.follow_edges.remove_between")]
    async fn remove_edges_between(&self, a: Uuid, b: Uuid) -> StoreResult<Vec<FollowEdge>> {
        let removed = sqlx::query_as::<_, FollowEdge>(
            r#"
            UPDATE follow_edges
            SET deleted_at = now(), updated_at = now()
            WHERE deleted_at IS NULL
              AND ((follower_id = $1 AND followed_id = $2)
                OR (follower_id = $2 AND followed_id = $1))
            RETURNING id, follower_id, followed_id, status, created_at, updated_at, deleted_at
            "#,
        )
        .bind(a)
        .bind(b)
        .fetch_all(&self.pool)
        .await?;

        Ok(removed)
    }

    async fn approved_counts(&self, user_id: Uuid) -> StoreResult<(i64, i64)> {
        let counts = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM follow_edges
                 WHERE followed_id = $1 AND status = 'approved' AND deleted_at IS NULL),
                (SELECT COUNT(*) FROM follow_edges
                 WHERE follower_id = $1 AND status = 'approved' AND deleted_at IS NULL)
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(counts)
    }
}

/// Postgres-backed counter store. Arithmetic happens inside single UPDATE
/// statements; callers never round-trip a value.
#[derive(Clone)]
pub struct PgCounterStore {
    pool: PgPool,
}

impl PgCounterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Every user id with a counter row; drives the reconciliation sweep.
    pub async fn counter_user_ids(&self) -> StoreResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>("SELECT user_id FROM user_counters")
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }
}

#[async_trait]
impl CounterStore for PgCounterStore {
    #[tracing::instrument(skip_all, name = "db.user_counters.increment")]
    async fn increment(&self, user_id: Uuid, field: CounterField) -> StoreResult<()> {
        // Identifier interpolation only; the column name comes from a closed
        // enum, never from input.
        let column = counter_column(field);
        let sql = format!(
            "INSERT INTO user_counters (user_id, {column}) VALUES ($1, 1) \
             ON CONFLICT (user_id) DO UPDATE \
             SET {column} = user_counters.{column} + 1, updated_at = now()"
        );

        sqlx::query(&sql).bind(user_id).execute(&self.pool).await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, name = "db.user_counters.decrement")]
    async fn decrement_clamped(&self, user_id: Uuid, field: CounterField) -> StoreResult<()> {
        let column = counter_column(field);
        let sql = format!(
            "UPDATE user_counters \
             SET {column} = GREATEST(0, {column} - 1), updated_at = now() \
             WHERE user_id = $1"
        );

        sqlx::query(&sql).bind(user_id).execute(&self.pool).await?;
        Ok(())
    }

    async fn get_or_initialize(&self, user_id: Uuid) -> StoreResult<UserCounters> {
        if let Some(counters) = sqlx::query_as::<_, UserCounters>(
            "SELECT user_id, follower_count, following_count, updated_at \
             FROM user_counters WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        {
            return Ok(counters);
        }

        // Seed from the true edge counts. DO NOTHING keeps two concurrent
        // bootstraps convergent; the re-read below returns whichever row won.
        sqlx::query(
            r#"
            INSERT INTO user_counters (user_id, follower_count, following_count)
            VALUES (
                $1,
                (SELECT COUNT(*) FROM follow_edges
                 WHERE followed_id = $1 AND status = 'approved' AND deleted_at IS NULL),
                (SELECT COUNT(*) FROM follow_edges
                 WHERE follower_id = $1 AND status = 'approved' AND deleted_at IS NULL)
            )
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        let counters = sqlx::query_as::<_, UserCounters>(
            "SELECT user_id, follower_count, following_count, updated_at \
             FROM user_counters WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(counters)
    }

    #[tracing::instrument(skip_all, name = "db.user_counters.reconcile")]
    async fn reconcile(&self, user_id: Uuid) -> StoreResult<UserCounters> {
        let counters = sqlx::query_as::<_, UserCounters>(
            r#"
            INSERT INTO user_counters (user_id, follower_count, following_count)
            VALUES (
                $1,
                (SELECT COUNT(*) FROM follow_edges
                 WHERE followed_id = $1 AND status = 'approved' AND deleted_at IS NULL),
                (SELECT COUNT(*) FROM follow_edges
                 WHERE follower_id = $1 AND status = 'approved' AND deleted_at IS NULL)
            )
            ON CONFLICT (user_id) DO UPDATE
            SET follower_count = EXCLUDED.follower_count,
                following_count = EXCLUDED.following_count,
                updated_at = now()
            RETURNING user_id, follower_count, following_count, updated_at
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(counters)
    }
}

/// Reads the externally-owned users table.
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn exists(&self, id: Uuid) -> StoreResult<bool> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    async fn is_private(&self, id: Uuid) -> StoreResult<Option<bool>> {
        let is_private =
            sqlx::query_scalar::<_, bool>("SELECT is_private FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(is_private)
    }
}
