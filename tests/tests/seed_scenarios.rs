//! End-to-end coverage of the reconciliation/fan-out pipeline's seed
//! scenarios, run against a real Postgres container rather than a mocked
//! pool — the properties under test (the atomic upsert's version guard,
//! the outbox's dedup-on-conflict, the fan-out unique constraint) only
//! hold meaning against the real engine.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use delivery_worker_service::{BotPublisher, DeliveryWorker};
use domain::Version;
use engine_rpc::EngineRpcClient;
use engine_service::EngineService;
use error_types::DomainError;
use outbox_relay_service::OutboxRelay;
use sqlx::Row;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Records every `telegram_id` it was asked to publish to, instead of
/// calling out to a real bot transport.
struct FakePublisher {
    sent_to: Mutex<HashSet<i64>>,
}

impl FakePublisher {
    fn new() -> Self {
        Self {
            sent_to: Mutex::new(HashSet::new()),
        }
    }

    async fn sent_to(&self) -> HashSet<i64> {
        self.sent_to.lock().await.clone()
    }
}

#[async_trait]
impl BotPublisher for FakePublisher {
    async fn publish(&self, telegram_id: i64, _event_type: &str, _payload: &serde_json::Value) -> bool {
        self.sent_to.lock().await.insert(telegram_id);
        true
    }
}

async fn seed_user_and_subscription(pool: &sqlx::PgPool, engine_id: Uuid, event_type: &str) -> (Uuid, i64) {
    let user_id = Uuid::new_v4();
    let telegram_id: i64 = rand_i64();
    sqlx::query("INSERT INTO users (id, telegram_id) VALUES ($1, $2)")
        .bind(user_id)
        .bind(telegram_id)
        .execute(pool)
        .await
        .expect("insert user");

    let subscription_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO engine_subscriptions (id, user_id, engine_id, event_type) VALUES ($1, $2, $3, $4)",
    )
    .bind(subscription_id)
    .bind(user_id)
    .bind(engine_id)
    .bind(event_type)
    .execute(pool)
    .await
    .expect("insert subscription");

    (subscription_id, telegram_id)
}

fn rand_i64() -> i64 {
    // Not cryptographic, just needs to be distinct enough to dodge the
    // `telegram_id` unique constraint across tests sharing one container.
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().subsec_nanos() as i64
}

fn service(pool: sqlx::PgPool) -> EngineService {
    EngineService::new(pool, Arc::new(EngineRpcClient::new(None)))
}

#[tokio::test]
#[serial_test::serial]
async fn new_engine_upsert_lands_in_ready() {
    let pool = xray_pipeline_tests::setup_postgres().await;
    let svc = service(pool.clone());

    let id = Uuid::new_v4();
    svc.upsert(id, true, None, "10.0.0.1:443".into(), Version::new(100, 0), "test:1-0")
        .await
        .expect("upsert");

    let row = sqlx::query("SELECT status, addr, version_ts, version_seq FROM engines WHERE id = $1")
        .bind(id)
        .fetch_one(&pool)
        .await
        .expect("fetch engine");
    let status: String = row.get("status");
    let addr: String = row.get("addr");
    assert_eq!(status, "ready");
    assert_eq!(addr, "10.0.0.1:443");
    assert_eq!(row.get::<i64, _>("version_ts"), 100);
    assert_eq!(row.get::<i32, _>("version_seq"), 0);

    // A first sighting raises no event: nothing existed before it to diff
    // against, so there is nothing for a subscriber to be notified of.
    let outbox_count: i64 = sqlx::query_scalar("SELECT count(*) FROM outbox WHERE aggregate_id = $1")
        .bind(id)
        .fetch_one(&pool)
        .await
        .expect("count outbox");
    assert_eq!(outbox_count, 0);
}

#[tokio::test]
#[serial_test::serial]
async fn stale_duplicate_version_is_a_silent_no_op() {
    let pool = xray_pipeline_tests::setup_postgres().await;
    let svc = service(pool.clone());

    let id = Uuid::new_v4();
    svc.upsert(id, true, None, "10.0.0.1:443".into(), Version::new(100, 0), "test:100-0")
        .await
        .expect("first upsert");
    svc.upsert(id, true, None, "10.0.0.2:443".into(), Version::new(101, 0), "test:101-0")
        .await
        .expect("second upsert");

    // Replaying the already-applied version must not move the stored addr
    // backwards, and must not raise a duplicate event.
    svc.upsert(id, false, None, "10.0.0.3:443".into(), Version::new(100, 0), "test:100-0-dup")
        .await
        .expect("stale replay should not error, just no-op");

    let row = sqlx::query("SELECT addr, version_ts FROM engines WHERE id = $1")
        .bind(id)
        .fetch_one(&pool)
        .await
        .expect("fetch engine");
    assert_eq!(row.get::<String, _>("addr"), "10.0.0.2:443");
    assert_eq!(row.get::<i64, _>("version_ts"), 101);
}

#[tokio::test]
#[serial_test::serial]
async fn mark_dead_then_restore_round_trips_through_ready() {
    let pool = xray_pipeline_tests::setup_postgres().await;
    let svc = service(pool.clone());

    let id = Uuid::new_v4();
    svc.upsert(id, true, None, "10.0.0.1:443".into(), Version::new(100, 0), "test:100-0")
        .await
        .expect("seed engine");

    svc.mark_dead(id, Version::new(101, 0), "test:101-0")
        .await
        .expect("mark dead");

    let status: String = sqlx::query_scalar("SELECT status FROM engines WHERE id = $1")
        .bind(id)
        .fetch_one(&pool)
        .await
        .expect("fetch status");
    assert_eq!(status, "dead");

    svc.upsert(id, true, None, "10.0.0.9:443".into(), Version::new(102, 0), "test:102-0")
        .await
        .expect("restore via upsert");

    let row = sqlx::query("SELECT status, addr FROM engines WHERE id = $1")
        .bind(id)
        .fetch_one(&pool)
        .await
        .expect("fetch restored engine");
    assert_eq!(row.get::<String, _>("status"), "active");
    // addr is immutable after insert: a later upsert's addr argument is
    // ignored, the original sighting's address is the one that sticks.
    assert_eq!(row.get::<String, _>("addr"), "10.0.0.1:443");

    let event_types: Vec<String> = sqlx::query_scalar("SELECT event_type FROM outbox WHERE aggregate_id = $1 ORDER BY occurred_at")
        .bind(id)
        .fetch_all(&pool)
        .await
        .expect("fetch event types");
    assert_eq!(event_types, vec!["EngineDead".to_string(), "EngineRestored".to_string()]);
}

#[tokio::test]
#[serial_test::serial]
async fn mark_dead_on_absent_aggregate_raises_engine_not_exist() {
    let pool = xray_pipeline_tests::setup_postgres().await;
    let svc = service(pool.clone());

    let id = Uuid::new_v4();
    let err = svc
        .mark_dead(id, Version::new(100, 0), "test:100-0")
        .await
        .expect_err("absent aggregate must error, not silently succeed");
    assert!(matches!(err, DomainError::EngineNotExist(_)));
}

#[tokio::test]
#[serial_test::serial]
async fn fan_out_then_relay_again_produces_no_duplicate_tasks() {
    let pool = xray_pipeline_tests::setup_postgres().await;
    let svc = service(pool.clone());

    let id = Uuid::new_v4();
    svc.upsert(id, true, None, "10.0.0.1:443".into(), Version::new(100, 0), "test:100-0")
        .await
        .expect("seed engine");
    let (subscription_id, _telegram_id) = seed_user_and_subscription(&pool, id, "EngineDead").await;

    svc.mark_dead(id, Version::new(101, 0), "test:101-0")
        .await
        .expect("mark dead raises EngineDead event");

    let relay = OutboxRelay::new(pool.clone(), pool.clone(), 10, 5);
    let fanned = relay.process_batch().await.expect("first relay pass");
    assert_eq!(fanned, 1);

    let tasks: Vec<(Uuid, bool)> = sqlx::query_as("SELECT subscription_id, published FROM bot_delivery_tasks")
        .fetch_all(&pool)
        .await
        .expect("fetch tasks");
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].0, subscription_id);
    assert!(!tasks[0].1);

    // Re-running the relay against the same (now fanned-out) outbox row
    // must not produce a second task for the same subscription.
    let fanned_again = relay.process_batch().await.expect("second relay pass");
    assert_eq!(fanned_again, 0);

    let task_count: i64 = sqlx::query_scalar("SELECT count(*) FROM bot_delivery_tasks")
        .fetch_one(&pool)
        .await
        .expect("count tasks");
    assert_eq!(task_count, 1);
}

#[tokio::test]
#[serial_test::serial]
async fn fan_out_then_deliver_publishes_to_both_subscribers() {
    let pool = xray_pipeline_tests::setup_postgres().await;
    let svc = service(pool.clone());

    let id = Uuid::new_v4();
    svc.upsert(id, true, None, "10.0.0.1:443".into(), Version::new(100, 0), "test:100-0")
        .await
        .expect("seed engine");
    let (sub1, tg1) = seed_user_and_subscription(&pool, id, "EngineUpdated").await;
    let (sub2, tg2) = seed_user_and_subscription(&pool, id, "EngineUpdated").await;

    svc.upsert(id, false, None, "10.0.0.1:443".into(), Version::new(101, 0), "test:101-0")
        .await
        .expect("update raises EngineUpdated event");

    let relay = OutboxRelay::new(pool.clone(), pool.clone(), 10, 5);
    let fanned = relay.process_batch().await.expect("relay pass");
    assert_eq!(fanned, 1);

    let publisher = Arc::new(FakePublisher::new());
    let worker = DeliveryWorker::new(pool.clone(), pool.clone(), publisher.clone(), 10, 5);
    let processed = worker.process_batch().await.expect("delivery pass");
    assert_eq!(processed, 2);

    let sent_to = publisher.sent_to().await;
    assert_eq!(sent_to, HashSet::from([tg1, tg2]));

    let published: Vec<(Uuid, bool)> = sqlx::query_as("SELECT subscription_id, published FROM bot_delivery_tasks")
        .fetch_all(&pool)
        .await
        .expect("fetch tasks");
    assert_eq!(published.len(), 2);
    let published_subs: HashSet<Uuid> = published.iter().filter(|(_, p)| *p).map(|(s, _)| *s).collect();
    assert_eq!(published_subs, HashSet::from([sub1, sub2]));
}
