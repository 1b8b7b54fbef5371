// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Cross-context notification delivery.
//!
//! Flag changes are detected on the monitor's serial worker context, but
//! observers expect their callbacks on a single designated delivery context
//! (a UI-thread equivalent). A [`DeliveryExecutor`] is that context as an
//! injected capability: the default [`SerialDelivery`] drains a FIFO queue on
//! a dedicated task, while [`InlineDelivery`] runs jobs synchronously for
//! deterministic tests.

use std::sync::Arc;

use log::info;
use tokio::sync::mpsc;

/// A unit of work handed to the delivery context.
pub type Job = Box<dyn FnOnce() + Send>;

/// A single-threaded execution context for observer notification.
///
/// Implementations must run jobs in submission order on one logical context
/// and must not block the submitter.
pub trait DeliveryExecutor: Send + Sync {
    /// Submit a job for execution on the delivery context.
    fn dispatch(&self, job: Job);
}

/// Default delivery context: a dedicated task draining a FIFO job queue.
///
/// Jobs submitted from any thread run one at a time, in submission order.
/// The task exits once every handle to the executor has been dropped and the
/// queue has drained.
pub struct SerialDelivery {
    job_tx: mpsc::UnboundedSender<Job>,
}

impl std::fmt::Debug for SerialDelivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialDelivery").finish_non_exhaustive()
    }
}

impl SerialDelivery {
    /// Spawn the delivery task and return a shareable handle to it.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn() -> Arc<Self> {
        let (job_tx, mut job_rx) = mpsc::unbounded_channel::<Job>();

        tokio::spawn(async move {
            while let Some(job) = job_rx.recv().await {
                job();
            }
            info!("Delivery context drained, exiting");
        });

        Arc::new(Self { job_tx })
    }
}

impl DeliveryExecutor for SerialDelivery {
    fn dispatch(&self, job: Job) {
        // Send only fails once the delivery task is gone, at which point
        // there is nobody left to notify.
        let _ = self.job_tx.send(job);
    }
}

/// Delivery context that runs each job inline on the submitting thread.
///
/// With the monitor's serial worker as the only submitter this still
/// satisfies the single-context ordering contract, and makes notification
/// timing deterministic. Intended for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineDelivery;

impl DeliveryExecutor for InlineDelivery {
    fn dispatch(&self, job: Job) {
        job();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn test_inline_delivery_runs_immediately() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let delivery = InlineDelivery;

        for i in 0..3 {
            let seen = Arc::clone(&seen);
            delivery.dispatch(Box::new(move || seen.lock().unwrap().push(i)));
        }

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_serial_delivery_preserves_order() {
        let delivery = SerialDelivery::spawn();
        let (tx, mut rx) = mpsc::unbounded_channel();

        for i in 0..5 {
            let tx = tx.clone();
            delivery.dispatch(Box::new(move || {
                let _ = tx.send(i);
            }));
        }

        for expected in 0..5 {
            assert_eq!(rx.recv().await, Some(expected));
        }
    }
}
