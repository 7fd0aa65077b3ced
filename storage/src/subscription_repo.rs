//! Read-only lookups backing fan-out: which subscriptions care about a given
//! `(engine_id, event_type)` pair, and which Telegram chat a subscription
//! should be delivered to. These run against the plain/autocommit pool —
//! they never need row locks or transactional isolation.

use std::collections::HashMap;

use sqlx::PgPool;
use uuid::Uuid;

pub struct SubscriptionRepository;

impl SubscriptionRepository {
    pub async fn get_engine_subscriptions_for_events(
        pool: &PgPool,
        pairs: &[(Uuid, &str)],
    ) -> sqlx::Result<HashMap<(Uuid, String), Vec<Uuid>>> {
        let mut out: HashMap<(Uuid, String), Vec<Uuid>> = HashMap::new();
        if pairs.is_empty() {
            return Ok(out);
        }

        let engine_ids: Vec<Uuid> = pairs.iter().map(|(id, _)| *id).collect();
        let event_types: Vec<String> = pairs.iter().map(|(_, ty)| ty.to_string()).collect();

        let rows: Vec<(Uuid, Uuid, String)> = sqlx::query_as(
            r#"
            SELECT id, engine_id, event_type
            FROM engine_subscriptions
            WHERE (engine_id, event_type) IN (
                SELECT * FROM UNNEST($1::uuid[], $2::text[])
            )
            "#,
        )
        .bind(&engine_ids)
        .bind(&event_types)
        .fetch_all(pool)
        .await?;

        for (subscription_id, engine_id, event_type) in rows {
            out.entry((engine_id, event_type)).or_default().push(subscription_id);
        }
        Ok(out)
    }

    pub async fn get_telegram_ids_for_subscriptions(
        pool: &PgPool,
        subscription_ids: &[Uuid],
    ) -> sqlx::Result<HashMap<Uuid, i64>> {
        if subscription_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(Uuid, i64)> = sqlx::query_as(
            r#"
            SELECT s.id, u.telegram_id
            FROM engine_subscriptions s
            JOIN users u ON u.id = s.user_id
            WHERE s.id = ANY($1)
            "#,
        )
        .bind(subscription_ids)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().collect())
    }
}
