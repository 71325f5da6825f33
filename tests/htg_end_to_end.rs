// tests/htg_end_to_end.rs

use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use htgrun::client::{ClientOptions, PacingPolicy};
use htgrun::engine::HtgSubmitter;
use htgrun::errors::HtgError;
use htgrun::job::SUBGRAPH_KEY;
use htgrun::master::{MasterEvent, FIRST_CLIENT_ID};
use htgrun::types::{ClusterConfig, JobConfig, EXECUTION_MODEL_KEY};
use htgrun_test_utils::builders::{MetagraphBuilder, SubGraphBuilder};
use htgrun_test_utils::{init_tracing, two_stage_htg, with_timeout, FakeSubmitter, TestMaster};

const WORKER: &str = "edu.example.HtgWorker";

fn executed(events: &[MasterEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            MasterEvent::ExecuteRequested { subgraph } => Some(subgraph.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn two_stage_htg_is_submitted_and_requested_in_order() {
    init_tracing();
    let master = TestMaster::start().await;
    let fake = FakeSubmitter::new();
    let cancel = CancellationToken::new();

    let mut driver = HtgSubmitter::new(two_stage_htg(), WORKER, fake.clone())
        .with_job_config(JobConfig::new().with(EXECUTION_MODEL_KEY, "shared"))
        .with_cluster_config(ClusterConfig::new().with("queue", "batch"));

    let report = with_timeout(driver.submit_htg(&master.endpoint, &cancel))
        .await
        .unwrap();
    assert_eq!(report.order, vec!["G1".to_string(), "G2".to_string()]);
    assert_eq!(report.client_id, Some(FIRST_CLIENT_ID));

    let submitted = fake.submitted();
    assert_eq!(submitted.len(), 2);

    let g1 = &submitted[0];
    assert_eq!(g1.job_name, "two-stage");
    assert_eq!(g1.subgraph, "G1");
    assert_eq!(g1.worker_class, WORKER);
    assert_eq!(g1.compute_resource.cpu, 2.0);
    assert_eq!(g1.compute_resource.ram_mega_bytes, 512);
    assert_eq!(g1.compute_resource.disk_giga_bytes, 1);
    assert_eq!(g1.compute_resource.instances, 2);
    assert_eq!(g1.config.get(EXECUTION_MODEL_KEY), Some("shared"));
    assert_eq!(g1.config.get(SUBGRAPH_KEY), Some("G1"));

    let g2 = &submitted[1];
    assert_eq!(g2.subgraph, "G2");
    assert_eq!(g2.compute_resource.cpu, 1.0);
    assert_eq!(g2.compute_resource.ram_mega_bytes, 256);
    assert_eq!(g2.compute_resource.instances, 1);
    assert_eq!(g2.config.get(SUBGRAPH_KEY), Some("G2"));

    let events = master.finish().await;
    let connects = events
        .iter()
        .filter(|e| matches!(e, MasterEvent::ClientConnected { .. }))
        .count();
    assert_eq!(connects, 1);
    assert_eq!(executed(&events), vec!["G1".to_string(), "G2".to_string()]);
    assert_eq!(
        events.last(),
        Some(&MasterEvent::ClientClosed {
            client_id: FIRST_CLIENT_ID
        })
    );
}

#[tokio::test]
async fn fan_in_requests_both_parents_before_the_child() {
    init_tracing();
    let master = TestMaster::start().await;
    let fake = FakeSubmitter::new();
    let cancel = CancellationToken::new();

    let mg = MetagraphBuilder::new("fan-in")
        .with_subgraph("C")
        .with_subgraph("A")
        .with_subgraph("B")
        .with_relation("A", "C")
        .with_relation("B", "C")
        .build();
    let mut driver = HtgSubmitter::new(mg, WORKER, fake.clone());

    let report = with_timeout(driver.submit_htg(&master.endpoint, &cancel))
        .await
        .unwrap();
    assert_eq!(report.order, vec!["A", "B", "C"]);
    assert_eq!(fake.submitted_names(), report.order);

    let events = master.finish().await;
    assert_eq!(executed(&events), report.order);
}

#[tokio::test]
async fn random_pacing_still_sends_everything_in_order() {
    init_tracing();
    let master = TestMaster::start().await;
    let fake = FakeSubmitter::new();
    let cancel = CancellationToken::new();

    let mg = MetagraphBuilder::new("chain")
        .with_subgraph("S3")
        .with_subgraph("S2")
        .with_subgraph("S1")
        .with_relation("S1", "S2")
        .with_relation("S2", "S3")
        .build();
    let mut driver = HtgSubmitter::new(mg, WORKER, fake.clone()).with_client_options(
        ClientOptions {
            pacing: PacingPolicy::RandomDelay {
                ceiling: Duration::from_millis(20),
            },
            ..ClientOptions::default()
        },
    );

    let report = with_timeout(driver.submit_htg(&master.endpoint, &cancel))
        .await
        .unwrap();
    assert_eq!(report.order, vec!["S1", "S2", "S3"]);

    let events = master.finish().await;
    assert_eq!(executed(&events), vec!["S1", "S2", "S3"]);
}

#[tokio::test]
async fn submission_failure_stops_the_run_at_that_stage() {
    init_tracing();
    let master = TestMaster::start().await;
    let fake = FakeSubmitter::failing_on("G2");
    let cancel = CancellationToken::new();

    let mut driver = HtgSubmitter::new(two_stage_htg(), WORKER, fake.clone());
    let err = with_timeout(driver.submit_htg(&master.endpoint, &cancel))
        .await
        .unwrap_err();

    match &err {
        HtgError::Stage {
            stage, subgraph, ..
        } => {
            assert_eq!(*stage, 1);
            assert_eq!(subgraph, "G2");
        }
        other => panic!("expected a stage error, got {other:?}"),
    }
    assert!(matches!(err.root(), HtgError::Submission { subgraph, .. } if subgraph == "G2"));
    assert_eq!(fake.submitted_names(), vec!["G1"]);

    // The session opened for G1 is still closed exactly once.
    let events = master.finish().await;
    assert_eq!(executed(&events), vec!["G1"]);
    let closes = events
        .iter()
        .filter(|e| matches!(e, MasterEvent::ClientClosed { .. }))
        .count();
    assert_eq!(closes, 1);
}

#[tokio::test]
async fn first_stage_failure_never_connects() {
    init_tracing();
    let mut master = TestMaster::start().await;
    let fake = FakeSubmitter::failing_on("G1");
    let cancel = CancellationToken::new();

    let mut driver = HtgSubmitter::new(two_stage_htg(), WORKER, fake.clone());
    let err = with_timeout(driver.submit_htg(&master.endpoint, &cancel))
        .await
        .unwrap_err();
    assert!(matches!(err, HtgError::Stage { stage: 0, .. }));
    assert!(fake.submitted().is_empty());

    assert!(master.events.try_recv().is_err());
    master.shutdown.cancel();
    assert!(master.finish().await.is_empty());
}

#[tokio::test]
async fn invalid_graph_is_rejected_before_any_submission() {
    init_tracing();
    let fake = FakeSubmitter::new();
    let cancel = CancellationToken::new();

    let mg = MetagraphBuilder::new("cyclic")
        .with_subgraph("A")
        .with_subgraph("B")
        .with_relation("A", "B")
        .with_relation("B", "A")
        .build();
    let mut driver = HtgSubmitter::new(mg, WORKER, fake.clone());

    // Nothing listens here; the run must fail before trying to connect.
    let err = driver.submit_htg("127.0.0.1:1", &cancel).await.unwrap_err();
    assert!(matches!(err, HtgError::CyclicDependency { .. }));
    assert!(fake.submitted().is_empty());
}

#[tokio::test]
async fn bad_resources_on_a_later_stage_block_the_whole_run() {
    init_tracing();
    let fake = FakeSubmitter::new();
    let cancel = CancellationToken::new();

    let mg = MetagraphBuilder::new("bad")
        .with_subgraph("A")
        .with(SubGraphBuilder::new("B").instances(0).build())
        .with_relation("A", "B")
        .build();
    let mut driver = HtgSubmitter::new(mg, WORKER, fake.clone());

    let err = driver.submit_htg("127.0.0.1:1", &cancel).await.unwrap_err();
    assert!(matches!(err, HtgError::InvalidResourceSpec { ref subgraph, .. } if subgraph == "B"));
    assert!(fake.submitted().is_empty());
}

#[tokio::test]
async fn cancellation_during_pacing_aborts_the_run() {
    init_tracing();
    // Accepts the session but never acknowledges anything.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let fake = FakeSubmitter::new();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let mut driver = HtgSubmitter::new(two_stage_htg(), WORKER, fake.clone());
    let err = with_timeout(driver.submit_htg(&endpoint, &cancel))
        .await
        .unwrap_err();

    assert!(matches!(err.root(), HtgError::Cancelled));
    assert!(matches!(err, HtgError::Stage { stage: 0, .. }));
    assert_eq!(fake.submitted_names(), vec!["G1"]);
}

#[tokio::test]
async fn cancelled_before_start_submits_nothing() {
    init_tracing();
    let fake = FakeSubmitter::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut driver = HtgSubmitter::new(two_stage_htg(), WORKER, fake.clone());
    let err = driver.submit_htg("127.0.0.1:1", &cancel).await.unwrap_err();
    assert!(matches!(err.root(), HtgError::Cancelled));
    assert!(fake.submitted().is_empty());
}

#[test]
fn plan_builds_descriptors_in_schedule_order() {
    let driver = HtgSubmitter::new(two_stage_htg(), WORKER, FakeSubmitter::new())
        .with_job_config(JobConfig::new().with("wordcount.input", "/data/in"));

    let stages = driver.plan().unwrap();
    let names: Vec<_> = stages.iter().map(|d| d.subgraph.as_str()).collect();
    assert_eq!(names, ["G1", "G2"]);
    assert!(stages
        .iter()
        .all(|d| d.config.get("wordcount.input") == Some("/data/in")));
    assert!(driver.submitter().submitted().is_empty());
}
