mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use codec_primitive::{Int64Codec, StringCodec};
use tester_api::{CollectingReporter, GroupGraph};
use tester_engine::{Tester, TesterConfig};

use common::{Forward, Gated};

async fn scores() -> (Tester, Arc<CollectingReporter>) {
    let reporter = Arc::new(CollectingReporter::new());
    let tester = Tester::with_reporter(TesterConfig::default(), reporter.clone());
    let graph = GroupGraph::define("scorer")
        .input("scores", Int64Codec)
        .output("results", Int64Codec);
    tester.register_group_graph(&graph, Arc::new(Forward::to("results"))).await;
    (tester, reporter)
}

#[tokio::test]
async fn tracker_starts_at_the_end_of_known_streams() {
    let (tester, _) = scores().await;
    tester.consume("scores", "alice", 10).await;

    let mut tracker = tester.new_message_tracker().await;
    assert_eq!(tracker.offset("scores"), 1);
    assert_eq!(tracker.offset("results"), 1);
    assert!(tracker.unseen("scores").next().is_none());

    tester.consume("scores", "bob", 7).await;
    assert_eq!(tracker.next_message("results"), Some(("bob".to_string(), Some(json!(7)))));
    assert_eq!(tracker.offset("results"), 2);
}

#[tokio::test]
async fn unseen_is_lazy_and_restartable() {
    let (tester, _) = scores().await;
    let mut tracker = tester.new_message_tracker().await;

    tester.consume("scores", "a", 1).await;
    tester.consume("scores", "b", 2).await;
    let first: Vec<_> = tracker.unseen("results").take(1).map(|r| r.key).collect();
    assert_eq!(first, ["a"]);

    tester.consume("scores", "c", 3).await;
    let rest: Vec<_> = tracker.unseen("results").map(|r| (r.offset, r.key)).collect();
    assert_eq!(rest, [(1, "b".to_string()), (2, "c".to_string())]);
    assert!(tracker.unseen("results").next().is_none());
}

#[tokio::test]
async fn move_to_end_skips_history() {
    let (tester, _) = scores().await;
    let mut tracker = tester.new_message_tracker().await;
    tester.consume("scores", "a", 1).await;
    tester.consume("scores", "b", 2).await;

    tracker.move_to_end("results");
    assert!(tracker.next_message("results").is_none());
    assert_eq!(tracker.next_message("scores").map(|(k, _)| k).as_deref(), Some("a"));

    tracker.move_to_end_all();
    assert!(tracker.next_message("scores").is_none());
}

#[tokio::test]
async fn topics_created_after_the_tracker_start_at_zero() {
    let tester = Tester::new(TesterConfig::default());
    let mut tracker = tester.new_message_tracker().await;
    tester
        .register_group_graph(
            &GroupGraph::define("g").input("fresh", StringCodec),
            Arc::new(Forward::to("fresh-out")),
        )
        .await;
    tester.consume_string("fresh", "k", "v").await;

    assert_eq!(tracker.offset("fresh"), 0);
    assert_eq!(tracker.unseen("fresh").count(), 1);
    assert_eq!(tracker.unseen("fresh-out").count(), 1);
    assert_eq!(tracker.offset("never-created"), 0);
    assert!(tracker.unseen("never-created").next().is_none());
}

#[tokio::test]
async fn tombstones_are_reported_without_a_value() {
    let (tester, _) = scores().await;
    let mut tracker = tester.new_message_tracker().await;
    tester.consume_tombstone("scores", "gone").await;

    assert_eq!(tracker.next_message("results"), Some(("gone".to_string(), None)));
    let raw = tracker.unseen("scores").next().unwrap();
    assert!(raw.is_tombstone());
}

#[tokio::test]
async fn expect_emit_checks_key_and_value() {
    let (tester, reporter) = scores().await;
    let mut tracker = tester.new_message_tracker().await;
    tester.consume("scores", "alice", 10).await;
    tester.consume("scores", "bob", 7).await;

    let mut checked = None;
    tracker.expect_emit("results", "alice", |value| checked = value);
    assert_eq!(checked, Some(json!(10)));
    assert!(!reporter.has_errors());

    tracker.expect_emit("results", "carol", |_| panic!("wrong key must not be checked"));
    assert_eq!(reporter.errors().len(), 1);
    assert!(reporter.errors()[0].contains("found key 'bob'"));

    tracker.expect_emit("results", "dave", |_| panic!("missing record must not be checked"));
    assert_eq!(reporter.errors().len(), 2);
    assert!(reporter.errors()[1].contains("found none"));
}

#[tokio::test]
async fn expect_empty_reports_unseen_records() {
    let (tester, reporter) = scores().await;
    let mut tracker = tester.new_message_tracker().await;

    tracker.expect_empty("results");
    assert!(!reporter.has_errors());

    tester.consume("scores", "alice", 10).await;
    tracker.expect_empty("results");
    assert_eq!(reporter.errors().len(), 1);
    assert!(reporter.errors()[0].contains("first key 'alice' at offset 0"));

    // the baseline did not move
    assert_eq!(tracker.unseen("results").count(), 1);
    tracker.expect_empty("results");
    assert_eq!(reporter.errors().len(), 1);
}

#[tokio::test]
async fn undecodable_records_are_reported() {
    let (tester, reporter) = scores().await;
    let mut tracker = tester.new_message_tracker().await;
    tester.consume("scores", "alice", 10).await;
    tester.consume_data("scores", "broken", b"ten".to_vec()).await;

    // the group consumer fails to decode and the failure is reported once
    assert_eq!(reporter.errors().len(), 1);

    assert!(tracker.next_message("scores").is_some());
    assert!(tracker.next_message("scores").is_none());
    assert_eq!(reporter.errors().len(), 2);
    assert_eq!(tracker.offset("scores"), 2);
}

#[tokio::test]
async fn tracker_waits_for_processor_setup() {
    let tester = Tester::new(TesterConfig::default());
    let (gated, started, release) = Gated::new();
    let graph = GroupGraph::define("slow").input("jobs", StringCodec);

    let register = tester.register_group_graph(&graph, Arc::new(gated));
    let create = async {
        started.await.unwrap();
        let early = tokio::time::timeout(Duration::from_millis(50), tester.new_message_tracker()).await;
        assert!(early.is_err(), "tracker created while setup was still running");

        release.send(()).unwrap();
        tester.new_message_tracker().await
    };
    let ((), tracker) = tokio::join!(register, create);

    assert_eq!(tracker.offset("jobs"), 0);
}
