//! Stream reclaim behavior against a real Redis container: an entry read by
//! one consumer but never acked sits pending; once it is idle long enough
//! and has exceeded the retry budget, the reclaimer's autoclaim pass must
//! route it to the dead-letter stream instead of redelivering it forever.

use std::sync::Arc;
use std::time::Duration;

use engine_rpc::EngineRpcClient;
use engine_service::EngineService;
use ingress_service::{Reclaimer, StreamClient};

#[tokio::test]
#[serial_test::serial]
async fn abandoned_entry_past_retry_budget_is_dead_lettered() {
    let pool = xray_pipeline_tests::setup_postgres().await;
    let conn = xray_pipeline_tests::setup_redis().await;

    let stream = "xray:engine-events:test".to_string();
    let dlq = "xray:engine-events:test:dlq".to_string();
    let group = "ingress".to_string();

    let abandoned_client = StreamClient::new(
        conn.clone(),
        stream.clone(),
        dlq.clone(),
        group.clone(),
        "consumer-doomed".to_string(),
    );
    abandoned_client.ensure_group().await.expect("create group");

    // Write an entry with a key that the handler will fail to parse as a
    // uuid, so that even if the reclaimer's retry budget check let it
    // through to `handle_entry`, dead-lettering is still driven purely by
    // the delivery-count/idle-time policy under test, not by whether the
    // payload happens to be valid.
    {
        let mut raw = conn.lock().await;
        let _: String = redis::cmd("XADD")
            .arg(&stream)
            .arg("*")
            .arg("key")
            .arg("xrayEngines:not-a-uuid")
            .arg("event")
            .arg("hset")
            .arg("payload")
            .arg("{}")
            .query_async(&mut *raw)
            .await
            .expect("xadd entry");
    }

    // Read it once under the doomed consumer so it becomes pending (and
    // attributed to that consumer) without ever being acked.
    let read = abandoned_client.read_new(10).await.expect("read new entries");
    assert_eq!(read.len(), 1, "expected the seeded entry to be delivered once");

    let engine_service = EngineService::new(pool, Arc::new(EngineRpcClient::new(None)));
    let reclaim_client = StreamClient::new(conn.clone(), stream.clone(), dlq.clone(), group.clone(), "consumer-reclaimer".to_string());

    let reclaimer = Reclaimer::new(
        reclaim_client,
        engine_service,
        /* idle_ms */ 0,
        /* batch_size */ 10,
        /* max_retry */ 0,
        Duration::from_millis(50),
    );

    let run = tokio::spawn(async move { reclaimer.run().await });
    tokio::time::sleep(Duration::from_millis(500)).await;
    run.abort();

    let mut raw = conn.lock().await;
    let dlq_len: i64 = redis::cmd("XLEN").arg(&dlq).query_async(&mut *raw).await.expect("xlen dlq");
    assert_eq!(dlq_len, 1, "entry past max_retry should have been routed to the DLQ");

    let pending: redis::Value = redis::cmd("XPENDING")
        .arg(&stream)
        .arg(&group)
        .query_async(&mut *raw)
        .await
        .expect("xpending summary");
    if let redis::Value::Array(fields) = pending {
        if let Some(redis::Value::Int(count)) = fields.first() {
            assert_eq!(*count, 0, "the dead-lettered entry should have been acked off the pending list");
        }
    }
}
