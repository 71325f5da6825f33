use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use htgrun::errors::{HtgError, Result};
use htgrun::job::{ClusterJobDescriptor, JobSubmitter};
use htgrun::types::ClusterConfig;

/// A fake submitter that:
/// - records every descriptor it is handed, in order
/// - optionally rejects the job for one named subgraph.
#[derive(Clone, Default)]
pub struct FakeSubmitter {
    submitted: Arc<Mutex<Vec<ClusterJobDescriptor>>>,
    fail_on: Option<String>,
}

impl FakeSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the submission of `subgraph` (and record nothing for it).
    pub fn failing_on(subgraph: &str) -> Self {
        Self {
            submitted: Arc::default(),
            fail_on: Some(subgraph.to_string()),
        }
    }

    pub fn submitted(&self) -> Vec<ClusterJobDescriptor> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn submitted_names(&self) -> Vec<String> {
        self.submitted
            .lock()
            .unwrap()
            .iter()
            .map(|d| d.subgraph.clone())
            .collect()
    }
}

impl JobSubmitter for FakeSubmitter {
    fn submit<'a>(
        &'a mut self,
        descriptor: &'a ClusterJobDescriptor,
        _cluster: &'a ClusterConfig,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        let submitted = Arc::clone(&self.submitted);
        let fail = self.fail_on.as_deref() == Some(descriptor.subgraph.as_str());

        Box::pin(async move {
            if fail {
                return Err(HtgError::Submission {
                    subgraph: descriptor.subgraph.clone(),
                    reason: "rejected by fake cluster".to_string(),
                });
            }
            submitted.lock().unwrap().push(descriptor.clone());
            Ok(())
        })
    }
}
