//! Queued request lifecycle
//!
//! Every outgoing command becomes a send task that collects its expected
//! responses and settles exactly once, either with the responses or with a
//! failure. A timer armed at enqueue time bounds the whole wait; a timer
//! that fires after settlement is a no-op.

use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};

use crate::protocol::SiMessage;

use super::error::LinkError;

/// Lifecycle state of a send task
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SendTaskState {
    /// Waiting in the queue
    Queued,
    /// Being written to the device
    Sending,
    /// Written, waiting for responses
    Sent,
    /// Settled with all expected responses
    Succeeded,
    /// Settled with an error
    Failed,
}

struct TaskInner {
    state: SendTaskState,
    responses: Vec<Vec<u8>>,
    resolver: Option<oneshot::Sender<Result<Vec<Vec<u8>>, LinkError>>>,
    timer: Option<tokio::task::JoinHandle<()>>,
}

/// One queued request with its expected response count
pub struct SendTask {
    message: SiMessage,
    expected_responses: usize,
    inner: StdMutex<TaskInner>,
    settled: watch::Sender<bool>,
}

impl SendTask {
    /// Create a task and the receiver its outcome will arrive on
    pub fn new(
        message: SiMessage,
        expected_responses: usize,
    ) -> (
        Arc<Self>,
        oneshot::Receiver<Result<Vec<Vec<u8>>, LinkError>>,
    ) {
        let (resolver, outcome) = oneshot::channel();
        let (settled, _) = watch::channel(false);
        let task = Arc::new(SendTask {
            message,
            expected_responses,
            inner: StdMutex::new(TaskInner {
                state: SendTaskState::Queued,
                responses: Vec::new(),
                resolver: Some(resolver),
                timer: None,
            }),
            settled,
        });
        (task, outcome)
    }

    /// The message this task will send
    pub fn message(&self) -> &SiMessage {
        &self.message
    }

    /// Number of command responses that settle the task
    pub fn expected_responses(&self) -> usize {
        self.expected_responses
    }

    /// Current state
    pub fn state(&self) -> SendTaskState {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).state
    }

    /// Whether the task has settled
    pub fn is_settled(&self) -> bool {
        matches!(
            self.state(),
            SendTaskState::Succeeded | SendTaskState::Failed
        )
    }

    /// Arm the timeout. Settles the task with [`LinkError::Timeout`] when it
    /// fires before the responses arrive.
    pub fn start_timer(self: &Arc<Self>, timeout: Duration) {
        let task = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if !task.is_settled() {
                tracing::warn!(message = %task.message, "send task timed out");
                task.fail(LinkError::Timeout);
            }
        });
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).timer = Some(handle);
    }

    pub(crate) fn mark_sending(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.state == SendTaskState::Queued {
            inner.state = SendTaskState::Sending;
        }
    }

    pub(crate) fn mark_sent(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.state == SendTaskState::Sending {
            inner.state = SendTaskState::Sent;
        }
    }

    /// Record one response. Returns `true` when the task just settled.
    pub(crate) fn add_response(&self, parameters: Vec<u8>) -> bool {
        let complete = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if matches!(
                inner.state,
                SendTaskState::Succeeded | SendTaskState::Failed
            ) {
                return false;
            }
            inner.responses.push(parameters);
            inner.responses.len() >= self.expected_responses
        };
        if complete {
            self.succeed();
        }
        complete
    }

    /// Settle successfully with the responses collected so far
    pub(crate) fn succeed(&self) {
        self.settle(SendTaskState::Succeeded, None);
    }

    /// Settle with an error
    pub(crate) fn fail(&self, error: LinkError) {
        self.settle(SendTaskState::Failed, Some(error));
    }

    fn settle(&self, state: SendTaskState, error: Option<LinkError>) {
        let (resolver, timer, responses) = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if matches!(
                inner.state,
                SendTaskState::Succeeded | SendTaskState::Failed
            ) {
                return;
            }
            inner.state = state;
            (
                inner.resolver.take(),
                inner.timer.take(),
                std::mem::take(&mut inner.responses),
            )
        };
        if let Some(timer) = timer {
            timer.abort();
        }
        if let Some(resolver) = resolver {
            let outcome = match error {
                None => Ok(responses),
                Some(error) => Err(error),
            };
            // The caller may have dropped the receiver; settlement stands
            // regardless.
            let _ = resolver.send(outcome);
        }
        // send_replace stores the value even while nobody subscribes;
        // send() would drop it and leave later waiters stuck on false.
        self.settled.send_replace(true);
    }

    /// Wait until the task settles
    pub(crate) async fn settled(&self) {
        if self.is_settled() {
            return;
        }
        let mut watcher = self.settled.subscribe();
        if *watcher.borrow() {
            return;
        }
        while watcher.changed().await.is_ok() {
            if *watcher.borrow() {
                return;
            }
        }
    }
}
