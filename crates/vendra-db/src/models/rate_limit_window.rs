//! Shared fixed-window rate-limit counters.
//!
//! One row per `(scope, bucket_start)`. Counts only grow within a bucket;
//! rows disappear when the janitor sweeps past `expires_at`. Admission is
//! a single conditional upsert so the ceiling holds across any number of
//! concurrent processes.

use chrono::{DateTime, Duration, DurationRound, Utc};
use sqlx::FromRow;

/// A rate-limit window row.
#[derive(Debug, Clone, FromRow)]
pub struct RateLimitWindow {
    pub scope: String,
    pub bucket_start: DateTime<Utc>,
    pub count: i64,
    pub expires_at: DateTime<Utc>,
}

impl RateLimitWindow {
    /// Align a timestamp to the start of its bucket.
    #[must_use]
    pub fn bucket_start_for(now: DateTime<Utc>, bucket_secs: i64) -> DateTime<Utc> {
        now.duration_trunc(Duration::seconds(bucket_secs))
            .unwrap_or(now)
    }

    /// Try to admit one call under `ceiling` for the current bucket.
    ///
    /// Returns `Some(count)` with the post-admission count, or `None` when
    /// the ceiling is already met. The `WHERE` clause on the upsert makes
    /// the check-and-increment atomic; two racing callers cannot both take
    /// the last slot.
    pub async fn try_admit(
        pool: &sqlx::PgPool,
        scope: &str,
        bucket_secs: i64,
        ceiling: i64,
    ) -> Result<Option<i64>, sqlx::Error> {
        let bucket_start = Self::bucket_start_for(Utc::now(), bucket_secs);
        let expires_at = bucket_start + Duration::seconds(bucket_secs * 2);

        let row: Option<(i64,)> = sqlx::query_as(
            r"
            INSERT INTO rate_limit_windows (scope, bucket_start, count, expires_at)
            VALUES ($1, $2, 1, $3)
            ON CONFLICT (scope, bucket_start)
            DO UPDATE SET count = rate_limit_windows.count + 1
            WHERE rate_limit_windows.count < $4
            RETURNING count
            ",
        )
        .bind(scope)
        .bind(bucket_start)
        .bind(expires_at)
        .bind(ceiling)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|(count,)| count))
    }

    /// Record one hit unconditionally (429 accounting for backoff sizing).
    pub async fn record_hit(
        pool: &sqlx::PgPool,
        scope: &str,
        bucket_secs: i64,
    ) -> Result<i64, sqlx::Error> {
        let bucket_start = Self::bucket_start_for(Utc::now(), bucket_secs);
        let expires_at = bucket_start + Duration::seconds(bucket_secs * 2);

        let (count,): (i64,) = sqlx::query_as(
            r"
            INSERT INTO rate_limit_windows (scope, bucket_start, count, expires_at)
            VALUES ($1, $2, 1, $3)
            ON CONFLICT (scope, bucket_start)
            DO UPDATE SET count = rate_limit_windows.count + 1
            RETURNING count
            ",
        )
        .bind(scope)
        .bind(bucket_start)
        .bind(expires_at)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }

    /// Total hits recorded for `scope` since `since`.
    pub async fn hits_since(
        pool: &sqlx::PgPool,
        scope: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        let (total,): (i64,) = sqlx::query_as(
            r"
            SELECT COALESCE(SUM(count), 0)::BIGINT
            FROM rate_limit_windows
            WHERE scope = $1 AND bucket_start >= $2
            ",
        )
        .bind(scope)
        .bind(since)
        .fetch_one(pool)
        .await?;
        Ok(total)
    }

    /// Seconds until the current bucket rolls over.
    #[must_use]
    pub fn secs_until_next_bucket(now: DateTime<Utc>, bucket_secs: i64) -> u64 {
        let bucket_start = Self::bucket_start_for(now, bucket_secs);
        let next = bucket_start + Duration::seconds(bucket_secs);
        (next - now).num_seconds().max(1) as u64
    }

    /// Sweep expired window rows. This is the only reset path short of an
    /// operator-triggered [`Self::reset_all`].
    pub async fn cleanup_expired(pool: &sqlx::PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM rate_limit_windows WHERE expires_at < NOW()")
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Operator-triggered full reset of all window state.
    pub async fn reset_all(pool: &sqlx::PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM rate_limit_windows")
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_bucket_alignment() {
        let t = Utc.with_ymd_and_hms(2026, 3, 4, 10, 37, 42).unwrap();
        let bucket = RateLimitWindow::bucket_start_for(t, 60);
        assert_eq!(bucket, Utc.with_ymd_and_hms(2026, 3, 4, 10, 37, 0).unwrap());

        let hour_bucket = RateLimitWindow::bucket_start_for(t, 3600);
        assert_eq!(
            hour_bucket,
            Utc.with_ymd_and_hms(2026, 3, 4, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_secs_until_next_bucket() {
        let t = Utc.with_ymd_and_hms(2026, 3, 4, 10, 37, 42).unwrap();
        assert_eq!(RateLimitWindow::secs_until_next_bucket(t, 60), 18);
    }

    #[test]
    fn test_secs_until_next_bucket_at_boundary_is_at_least_one() {
        let t = Utc.with_ymd_and_hms(2026, 3, 4, 10, 37, 0).unwrap();
        assert!(RateLimitWindow::secs_until_next_bucket(t, 60) >= 1);
    }
}
