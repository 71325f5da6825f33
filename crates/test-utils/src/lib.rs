pub mod builders;
pub mod fake_submitter;

use std::sync::Once;

use htgrun::master::{MasterEvent, MasterServer};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

pub use builders::{two_stage_htg, MetagraphBuilder, SubGraphBuilder};
pub use fake_submitter::FakeSubmitter;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// A master serving one HTG run on an ephemeral localhost port.
pub struct TestMaster {
    pub endpoint: String,
    pub events: mpsc::Receiver<MasterEvent>,
    pub shutdown: CancellationToken,
    pub handle: JoinHandle<htgrun::errors::Result<()>>,
}

impl TestMaster {
    pub async fn start() -> Self {
        let server = MasterServer::bind("127.0.0.1:0")
            .await
            .expect("bind test master");
        let endpoint = server.local_addr().expect("master address").to_string();
        let (tx, events) = mpsc::channel(64);
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let handle = tokio::spawn(async move { server.serve(tx, token).await });
        Self {
            endpoint,
            events,
            shutdown,
            handle,
        }
    }

    /// Drain every event until the session has ended.
    pub async fn finish(mut self) -> Vec<MasterEvent> {
        with_timeout(&mut self.handle)
            .await
            .expect("master task panicked")
            .expect("master serve failed");
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
