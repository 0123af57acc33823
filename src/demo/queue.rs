use crate::demo::registry::DemoId;
use crate::demo::setup::Orchestrator;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

/// Bounded queue of demos waiting for setup, drained by a fixed pool of
/// workers.
#[derive(Debug, Clone)]
pub struct SetupQueue {
    sender: mpsc::Sender<DemoId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueError {
    Full,
    Closed,
}

impl SetupQueue {
    /// Spawn `workers` tasks that set up queued demos one at a time each.
    pub fn start(orchestrator: Arc<Orchestrator>, workers: usize, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<DemoId>(capacity);
        let receiver = Arc::new(Mutex::new(receiver));

        for worker in 0..workers {
            let orchestrator = Arc::clone(&orchestrator);
            let receiver = Arc::clone(&receiver);
            tokio::spawn(async move {
                loop {
                    // Only hold the receiver while waiting, not while working.
                    let next = receiver.lock().await.recv().await;
                    let Some(id) = next else {
                        debug!("Setup worker {} stopping", worker);
                        break;
                    };
                    info!("Worker {} picked up demo {}", worker, id);
                    orchestrator.set_up_demo(&id).await;
                }
            });
        }

        info!("Started {} setup workers (queue capacity {})", workers, capacity);
        Self { sender }
    }

    pub fn enqueue(&self, id: DemoId) -> Result<(), EnqueueError> {
        self.sender.try_send(id).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }
}
