use activa_core::models::{Activity, SlotCorrection};
use activa_core::repository::{ActivityRepository, RepoResult};
use activa_core::search::{ActivityQuery, ActivitySort};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

const ACTIVITY_COLUMNS: &str =
    "id, title, description, location, price, available_slots, total_slots, created_at, updated_at";

pub struct StoreActivityRepository {
    pool: PgPool,
}

impl StoreActivityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal struct for type-safe querying
#[derive(sqlx::FromRow)]
struct ActivityRow {
    id: Uuid,
    title: String,
    description: String,
    location: String,
    price: f64,
    available_slots: i32,
    total_slots: i32,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<ActivityRow> for Activity {
    fn from(row: ActivityRow) -> Self {
        Activity {
            id: row.id,
            title: row.title,
            description: row.description,
            location: row.location,
            price: row.price,
            available_slots: row.available_slots,
            total_slots: row.total_slots,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CorrectionRow {
    activity_id: Uuid,
    recorded: i32,
    corrected: i32,
}

/// `%term%` with LIKE metacharacters escaped.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &ActivityQuery) {
    qb.push(" WHERE available_slots >= 1");

    if let Some(term) = &query.search {
        let pattern = like_pattern(term);
        qb.push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }

    if let Some(location) = &query.location {
        qb.push(" AND location ILIKE ").push_bind(like_pattern(location));
    }

    let (min, max) = query.price.bounds();
    if let Some(min) = min {
        qb.push(" AND price >= ").push_bind(min);
    }
    if let Some(max) = max {
        qb.push(" AND price <= ").push_bind(max);
    }
}

/// The trailing `id` keeps pages stable when the primary key ties.
fn order_clause(sort: ActivitySort) -> &'static str {
    match sort {
        ActivitySort::Title => " ORDER BY LOWER(title) ASC, id ASC",
        ActivitySort::PriceLow => " ORDER BY price ASC, id ASC",
        ActivitySort::PriceHigh => " ORDER BY price DESC, id ASC",
        ActivitySort::Location => " ORDER BY LOWER(location) ASC, id ASC",
    }
}

fn listing_sql(query: &ActivityQuery) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT {} FROM activities", ACTIVITY_COLUMNS));
    push_filters(&mut qb, query);
    qb.push(order_clause(query.sort));
    qb.push(" LIMIT ")
        .push_bind(query.limit as i64)
        .push(" OFFSET ")
        .push_bind(query.offset());
    qb
}

fn count_sql(query: &ActivityQuery) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM activities");
    push_filters(&mut qb, query);
    qb
}

#[async_trait]
impl ActivityRepository for StoreActivityRepository {
    async fn list_activities(
        &self,
        query: &ActivityQuery,
    ) -> RepoResult<(Vec<Activity>, i64)> {
        let total: i64 = count_sql(query)
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let rows: Vec<ActivityRow> = listing_sql(query)
            .build_query_as()
            .fetch_all(&self.pool)
            .await?;

        Ok((rows.into_iter().map(Activity::from).collect(), total))
    }

    async fn get_activity(
        &self,
        id: Uuid,
    ) -> RepoResult<Option<Activity>> {
        let row: Option<ActivityRow> = sqlx::query_as(&format!(
            "SELECT {} FROM activities WHERE id = $1",
            ACTIVITY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Activity::from))
    }

    async fn count_activities(&self) -> RepoResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM activities")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn reconcile_slots(&self) -> RepoResult<Vec<SlotCorrection>> {
        let mut tx = self.pool.begin().await?;

        // Wait out in-flight reservations so the booking counts below are settled.
        sqlx::query("SELECT id FROM activities ORDER BY id FOR UPDATE")
            .execute(&mut *tx)
            .await?;

        let rows: Vec<CorrectionRow> = sqlx::query_as(
            r#"
            WITH expected AS (
                SELECT a.id,
                       a.available_slots AS recorded,
                       GREATEST(a.total_slots - COUNT(b.id)::INT, 0) AS corrected
                FROM activities a
                LEFT JOIN bookings b ON b.activity_id = a.id
                GROUP BY a.id
            )
            UPDATE activities AS act
            SET available_slots = e.corrected, updated_at = NOW()
            FROM expected e
            WHERE act.id = e.id AND act.available_slots <> e.corrected
            RETURNING act.id AS activity_id, e.recorded, e.corrected
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(rows
            .into_iter()
            .map(|r| SlotCorrection {
                activity_id: r.activity_id,
                recorded: r.recorded,
                corrected: r.corrected,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use activa_core::search::PriceBucket;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("yoga"), "%yoga%");
        assert_eq!(like_pattern("100%_fun\\"), "%100\\%\\_fun\\\\%");
    }

    #[test]
    fn test_listing_sql_with_all_filters() {
        let query = ActivityQuery {
            page: 2,
            limit: 10,
            search: Some("dive".into()),
            location: Some("goa".into()),
            price: PriceBucket::From25To50,
            sort: ActivitySort::PriceHigh,
        };
        let qb = listing_sql(&query);
        assert_eq!(
            qb.sql(),
            format!(
                "SELECT {} FROM activities WHERE available_slots >= 1 \
                 AND (title ILIKE $1 OR description ILIKE $2) \
                 AND location ILIKE $3 AND price >= $4 AND price <= $5 \
                 ORDER BY price DESC, id ASC LIMIT $6 OFFSET $7",
                ACTIVITY_COLUMNS
            )
        );
    }

    #[test]
    fn test_count_sql_without_filters() {
        let qb = count_sql(&ActivityQuery::default());
        assert_eq!(qb.sql(), "SELECT COUNT(*) FROM activities WHERE available_slots >= 1");
    }

    #[test]
    fn test_open_ended_buckets_bind_one_bound() {
        let low = ActivityQuery { price: PriceBucket::UpTo25, ..Default::default() };
        assert!(count_sql(&low).sql().ends_with("AND price <= $1"));

        let high = ActivityQuery { price: PriceBucket::From100, ..Default::default() };
        assert!(count_sql(&high).sql().ends_with("AND price >= $1"));
    }
}
