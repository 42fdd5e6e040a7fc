#![allow(dead_code)]

use std::error::Error;
use std::time::Duration;

use mailsweep::engine::AutomationService;
use mailsweep::jobs::Job;

pub use mailsweep_test_utils::{init_tracing, test_now, with_timeout};

pub type TestResult = Result<(), Box<dyn Error>>;

/// Poll until the job reaches a terminal state.
pub async fn wait_for_terminal(service: &AutomationService, job_id: &str) -> Job {
    with_timeout(async {
        loop {
            let job = service.get_job(job_id).expect("job exists");
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}
