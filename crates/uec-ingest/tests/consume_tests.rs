//! End-to-end consume runs against a real PostgreSQL
//!
//! Run with: cargo test -p uec-ingest --test consume_tests -- --ignored

mod common;

use chrono::NaiveDateTime;
use common::{cn_bot_line, cn_line, init_test_tracing, lp_line, LogDir, TestPostgres};
use uec_ingest::orchestrator::{ConsumeOptions, Consumer};
use uec_ingest::select::SelectionWindow;
use uec_ingest::EventType;

fn ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y%m%d%H%M%S").expect("valid timestamp")
}

fn window(from: Option<&str>, latest: bool, to: Option<&str>) -> ConsumeOptions {
    ConsumeOptions::new(
        SelectionWindow::new(from.map(ts), latest, to.map(ts)).expect("valid window"),
    )
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_from_latest_consumed_skips_completed_file() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("Failed to start PostgreSQL");
    let logs = LogDir::new();
    logs.write("cn-20230101-000000.log", &[cn_line("a1"), cn_line("a2")]);
    logs.write("cn-20230102-000000.log", &[cn_line("b1")]);

    let consumer = Consumer::new(pg.pool_clone(), logs.config(EventType::CentralNotice, 10));

    let first = consumer
        .run(&window(None, false, Some("20230101235959")))
        .await
        .expect("first run");
    assert_eq!(first.files_consumed(), 1);
    assert_eq!(first.files_outside_window(), 1);

    let second = consumer
        .run(&window(None, true, None))
        .await
        .expect("second run");
    assert_eq!(second.files_consumed(), 1);
    assert_eq!(second.files_skipped_complete(), 1);
    assert_eq!(second.events_consumed(), 1);

    assert_eq!(pg.status_of("cn-20230102-000000.log").await.unwrap().as_deref(), Some("complete"));
    assert_eq!(pg.count("centralnotice_events").await.unwrap(), 3);

    // Nothing left to do: both files are complete.
    let third = consumer.run(&window(None, true, None)).await.expect("third run");
    assert_eq!(third.files_consumed(), 0);
    assert_eq!(third.files_skipped_complete(), 2);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_malformed_lines_counted_not_inserted() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("Failed to start PostgreSQL");
    let logs = LogDir::new();
    logs.write(
        "cn-20230101-000000.log",
        &[
            cn_line("v1"),
            "{not json".to_string(),
            cn_line("v2"),
            r#"{"uuid":"x","event":{}}"#.to_string(),
            cn_line("v3"),
        ],
    );

    let consumer = Consumer::new(pg.pool_clone(), logs.config(EventType::CentralNotice, 10));
    let stats = consumer.run(&window(None, false, None)).await.expect("run");

    assert_eq!(stats.events_consumed(), 3);
    assert_eq!(stats.events_invalid(), 2);
    assert_eq!(stats.invalid_reasons().get("invalid json"), Some(&1));
    assert_eq!(pg.count("centralnotice_events").await.unwrap(), 3);

    let invalid: i64 =
        sqlx::query_scalar("SELECT invalid_events FROM files WHERE filename = $1")
            .bind("cn-20230101-000000.log")
            .fetch_one(pg.pool())
            .await
            .unwrap();
    assert_eq!(invalid, 2);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_bots_ignored_and_sample_rate_recorded() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("Failed to start PostgreSQL");
    let logs = LogDir::new();
    logs.write_gz(
        "cn-sampled10-20230101-000000.log.gz",
        &[cn_line("h1"), cn_bot_line("bot1")],
    );

    let consumer = Consumer::new(pg.pool_clone(), logs.config(EventType::CentralNotice, 10));
    let stats = consumer.run(&window(None, false, None)).await.expect("run");

    assert_eq!(stats.events_consumed(), 1);
    assert_eq!(stats.events_ignored(), 1);

    let rate: f64 = sqlx::query_scalar("SELECT sample_rate FROM centralnotice_events")
        .fetch_one(pg.pool())
        .await
        .unwrap();
    assert_eq!(rate, 10.0);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_landingpage_buckets_sum_across_flushes() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("Failed to start PostgreSQL");
    let logs = LogDir::new();

    // 1000 events over 4 keys: two sources x two minutes.
    let lines: Vec<String> = (0..1000)
        .map(|i| {
            let source = if i % 2 == 0 { "sA" } else { "sB" };
            let line = lp_line(&format!("lp{}", i), source, i % 60, "");
            if i % 4 < 2 {
                line
            } else {
                line.replace("10:15:", "10:16:")
            }
        })
        .collect();
    logs.write("lp-20230101-000000.log", &lines);

    let consumer = Consumer::new(pg.pool_clone(), logs.config(EventType::LandingPage, 10));
    let stats = consumer.run(&window(None, false, None)).await.expect("run");

    assert_eq!(stats.events_consumed(), 1000);
    // 100 flushes of 10 events, each touching all 4 rows.
    assert_eq!(stats.bucket_upserts(), 400);
    assert_eq!(pg.count("landingpage_buckets").await.unwrap(), 4);

    let total: i64 = sqlx::query_scalar("SELECT SUM(event_count)::BIGINT FROM landingpage_buckets")
        .fetch_one(pg.pool())
        .await
        .unwrap();
    assert_eq!(total, 1000);

    let page: String = sqlx::query_scalar("SELECT DISTINCT landingpage FROM landingpage_buckets")
        .fetch_one(pg.pool())
        .await
        .unwrap();
    assert_eq!(page, "default~default~JimmyQuote~default~default");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_unique_contacts_first_sighting_wins() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("Failed to start PostgreSQL");
    let logs = LogDir::new();
    logs.write(
        "lp-20230101-000000.log",
        &[lp_line("c1", "sA", 1, "1001"), lp_line("c2", "sA", 2, "1001")],
    );
    logs.write(
        "lp-20230102-000000.log",
        &[lp_line("c3", "sA", 3, "1001"), lp_line("c4", "sB", 4, "1001")],
    );

    let consumer = Consumer::new(pg.pool_clone(), logs.config(EventType::LandingPage, 100));
    let stats = consumer.run(&window(None, false, None)).await.expect("run");

    assert_eq!(stats.files_consumed(), 2);
    assert_eq!(pg.count("donatewiki_unique").await.unwrap(), 2);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_corrupt_file_fails_alone() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("Failed to start PostgreSQL");
    let logs = LogDir::new();
    logs.write_raw("cn-20230101-000000.log.gz", b"definitely not gzip");
    logs.write("cn-20230102-000000.log", &[cn_line("ok1")]);
    logs.write("cn-badname.log", &[cn_line("never")]);

    let consumer = Consumer::new(pg.pool_clone(), logs.config(EventType::CentralNotice, 10));
    let stats = consumer.run(&window(None, false, None)).await.expect("run completes");

    assert_eq!(stats.files_consumed(), 1);
    assert_eq!(stats.files_malformed(), 1);
    assert_eq!(stats.failures().len(), 1);
    assert_eq!(stats.failures()[0].filename, "cn-20230101-000000.log.gz");

    assert_eq!(
        pg.status_of("cn-20230101-000000.log.gz").await.unwrap().as_deref(),
        Some("in_progress")
    );
    assert_eq!(pg.count("centralnotice_events").await.unwrap(), 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_event_types_do_not_see_each_other() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("Failed to start PostgreSQL");
    let logs = LogDir::new();
    logs.write("cn-20230101-000000.log", &[cn_line("x1")]);
    logs.write("lp-20230105-000000.log", &[lp_line("y1", "sA", 1, "")]);

    Consumer::new(pg.pool_clone(), logs.config(EventType::LandingPage, 10))
        .run(&window(None, false, None))
        .await
        .expect("landingpage run");

    // The later landingpage watermark must not hide the centralnotice file.
    let stats = Consumer::new(pg.pool_clone(), logs.config(EventType::CentralNotice, 10))
        .run(&window(None, true, None))
        .await
        .expect("centralnotice run");
    assert_eq!(stats.files_consumed(), 1);
}
