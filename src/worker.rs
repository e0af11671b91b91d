//! Layout worker threads.
//!
//! Requests and responses cross the thread boundary as owned messages over
//! crossbeam channels; each worker owns its own [`LayoutContext`]. Workers
//! share one request queue, so any idle worker picks up the next request.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::LayoutConfig;
use crate::error::WorkerError;
use crate::ir::PositionMap;
use crate::layout::{LayoutContext, LayoutOutcome, LayoutRequest, LayoutResponse, compute_layout};

/// The computation a worker runs for each request.
pub type LayoutJob = Arc<dyn Fn(&mut LayoutContext, &LayoutRequest) -> PositionMap + Send + Sync>;

pub fn default_job(config: LayoutConfig) -> LayoutJob {
    Arc::new(move |ctx: &mut LayoutContext, request: &LayoutRequest| {
        compute_layout(ctx, &request.snapshot, &request.seeds, &config)
    })
}

pub struct LayoutWorkerPool {
    requests: Option<Sender<LayoutRequest>>,
    responses: Receiver<LayoutResponse>,
    handles: Vec<JoinHandle<()>>,
}

impl LayoutWorkerPool {
    pub fn spawn(count: usize, config: LayoutConfig) -> Result<Self, WorkerError> {
        Self::spawn_with(count, default_job(config))
    }

    /// `count == 0` yields a pool that rejects every dispatch.
    pub fn spawn_with(count: usize, job: LayoutJob) -> Result<Self, WorkerError> {
        let (request_tx, request_rx) = unbounded::<LayoutRequest>();
        let (response_tx, response_rx) = unbounded::<LayoutResponse>();
        let mut handles = Vec::with_capacity(count);
        for idx in 0..count {
            let requests = request_rx.clone();
            let responses = response_tx.clone();
            let job = Arc::clone(&job);
            let handle = std::thread::Builder::new()
                .name(format!("layout-worker-{idx}"))
                .spawn(move || run_worker(job, requests, responses))?;
            handles.push(handle);
        }
        tracing::debug!(workers = count, "layout worker pool started");
        Ok(Self {
            requests: (count > 0).then_some(request_tx),
            responses: response_rx,
            handles,
        })
    }

    /// A pool with no workers, for callers that only want the synchronous
    /// fallback path.
    pub fn unavailable() -> Self {
        let (_, responses) = unbounded();
        Self {
            requests: None,
            responses,
            handles: Vec::new(),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    pub fn dispatch(&self, request: LayoutRequest) -> Result<(), WorkerError> {
        let Some(requests) = &self.requests else {
            return Err(WorkerError::Unavailable);
        };
        // Sending only fails once every worker thread has exited.
        requests
            .send(request)
            .map_err(|_| WorkerError::Unavailable)
    }

    pub fn try_recv(&self) -> Option<LayoutResponse> {
        self.responses.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<LayoutResponse> {
        match self.responses.recv_timeout(timeout) {
            Ok(response) => Some(response),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }
}

impl Drop for LayoutWorkerPool {
    fn drop(&mut self) {
        self.requests.take();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("layout worker thread panicked outside a job");
            }
        }
    }
}

fn run_worker(
    job: LayoutJob,
    requests: Receiver<LayoutRequest>,
    responses: Sender<LayoutResponse>,
) {
    let mut ctx = LayoutContext::new();
    for request in requests {
        let span = tracing::debug_span!(
            "layout",
            request_id = request.request_id,
            fingerprint = %request.fingerprint,
            nodes = request.snapshot.nodes.len()
        );
        let _entered = span.enter();
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| job(&mut ctx, &request))) {
            Ok(positions) => LayoutOutcome::Positions(positions),
            Err(payload) => {
                ctx = LayoutContext::new();
                let message = panic_message(payload.as_ref());
                tracing::warn!(error = %message, "layout job panicked");
                LayoutOutcome::Failed(message)
            }
        };
        let response = LayoutResponse {
            request_id: request.request_id,
            fingerprint: request.fingerprint,
            outcome,
        };
        if responses.send(response).is_err() {
            break;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "layout job panicked".to_string()
}
