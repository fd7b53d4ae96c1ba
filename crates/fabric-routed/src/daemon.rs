//! Event dispatch loop
//!
//! A single loop reads the inbound channel and hands each event to the
//! worker task owning its datapath. Events for one switch are handled in
//! arrival order; different switches proceed concurrently.
//!
//! Worker queues are bounded. When a switch's queue is full the loop waits
//! for it, which in turn stops the reader once the inbound channel fills.

use fabric_types::DatapathId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::controller::{ControllerEvent, RoutingController};

/// Counters reported when the loop exits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DaemonStats {
    pub events: usize,
    pub switches: usize,
    pub restarted_workers: usize,
}

type WorkerQueue = mpsc::Sender<ControllerEvent>;

/// Per-switch queue capacity unless configured otherwise.
pub const DEFAULT_WORKER_QUEUE_DEPTH: usize = 64;

pub struct FabricDaemon {
    controller: Arc<RoutingController>,
    worker_queue_depth: usize,
}

impl FabricDaemon {
    pub fn new(controller: Arc<RoutingController>) -> Self {
        Self {
            controller,
            worker_queue_depth: DEFAULT_WORKER_QUEUE_DEPTH,
        }
    }

    /// Sets the capacity of each switch's queue; at least 1.
    pub fn with_worker_queue_depth(mut self, depth: usize) -> Self {
        self.worker_queue_depth = depth.max(1);
        self
    }

    /// Runs until `events` closes or `shutdown` fires, then lets every
    /// worker finish the events already queued to it.
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<ControllerEvent>,
        shutdown: CancellationToken,
    ) -> DaemonStats {
        let mut workers: HashMap<DatapathId, WorkerQueue> = HashMap::new();
        let mut tasks = JoinSet::new();
        let mut stats = DaemonStats::default();

        info!("fabric-routed: dispatch loop started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("fabric-routed: shutdown requested");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => {
                        stats.events += 1;
                        tokio::select! {
                            _ = shutdown.cancelled() => {
                                info!("fabric-routed: shutdown requested while a queue was full");
                                break;
                            }
                            _ = self.dispatch(event, &mut workers, &mut tasks, &mut stats) => {}
                        }
                    }
                    None => {
                        debug!("event channel closed");
                        break;
                    }
                },
            }
        }

        stats.switches = workers.len();
        // Dropping the senders closes each worker's queue
        drop(workers);
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "worker task failed");
            }
        }

        info!(
            events = stats.events,
            switches = stats.switches,
            "fabric-routed: dispatch loop drained"
        );
        stats
    }

    async fn dispatch(
        &self,
        event: ControllerEvent,
        workers: &mut HashMap<DatapathId, WorkerQueue>,
        tasks: &mut JoinSet<()>,
        stats: &mut DaemonStats,
    ) {
        let dpid = event.dpid();
        let event = match workers.get(&dpid) {
            Some(queue) => match queue.send(event).await {
                Ok(()) => return,
                Err(mpsc::error::SendError(event)) => {
                    warn!(%dpid, "worker gone, restarting");
                    stats.restarted_workers += 1;
                    event
                }
            },
            None => event,
        };

        let queue = self.spawn_worker(dpid, tasks);
        if queue.send(event).await.is_err() {
            error!(%dpid, "new worker exited before its first event");
        }
        workers.insert(dpid, queue);
    }

    fn spawn_worker(&self, dpid: DatapathId, tasks: &mut JoinSet<()>) -> WorkerQueue {
        let (tx, mut rx) = mpsc::channel(self.worker_queue_depth);
        let controller = Arc::clone(&self.controller);
        tasks.spawn(async move {
            debug!(%dpid, "worker started");
            while let Some(event) = rx.recv().await {
                controller.handle_event(event).await;
            }
            debug!(%dpid, "worker drained");
        });
        tx
    }
}
