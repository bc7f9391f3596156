use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use tokio::time::{self, Instant};

use super::{ReportError, Reporter};
use crate::reading_cache::Snapshot;

/// In-memory `Reporter` that records what it was asked to send.
///
/// Pushes listed in `fail_on` fail, pushes listed in `slow_on` take
/// `slow_for` before finishing. Both use 1-based attempt numbers.
#[derive(Clone, Default)]
pub(crate) struct FakeStation {
    pub current: Snapshot,
    pub pushed: Arc<Mutex<Vec<Snapshot>>>,
    pub started: Arc<Mutex<Vec<Instant>>>,
    pub fail_on: Vec<usize>,
    pub slow_on: Vec<usize>,
    pub slow_for: Duration,
}

impl FakeStation {
    pub fn attempts(&self) -> usize {
        self.started.lock().unwrap().len()
    }
}

#[async_trait]
impl Reporter for FakeStation {
    fn update(&mut self, snapshot: Snapshot) {
        self.current = snapshot;
    }

    async fn push(&mut self) -> Result<(), ReportError> {
        let attempt = {
            let mut started = self.started.lock().unwrap();
            started.push(Instant::now());
            started.len()
        };
        if self.slow_on.contains(&attempt) {
            time::sleep(self.slow_for).await;
        }
        if self.fail_on.contains(&attempt) {
            return Err(ReportError::Rejected("simulated outage".into()));
        }
        self.pushed.lock().unwrap().push(self.current.clone());
        Ok(())
    }
}
