//! Target multiplexer
//!
//! One device reaches up to two stations: the directly attached one and a
//! remote one coupled over SRR or a cable. The multiplexer serializes all
//! requests into a single queue, keeps at most one in flight, and inserts
//! a SET_MS target switch ahead of a request whose target differs from the
//! last requested one. Responses are attributed to the in-flight task;
//! everything else is published to subscribers as unsolicited traffic.

use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::Instrument;

use crate::device::SiDevice;
use crate::protocol::{consts, parse_all, render, SiMessage};

use super::error::LinkError;
use super::send_task::{SendTask, SendTaskState};

/// Which station a request is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Target {
    /// No target has been requested yet
    Unknown,
    /// The directly attached station
    Direct,
    /// The coupled station behind the direct one
    Remote,
}

impl Target {
    fn ms_parameter(self) -> Option<u8> {
        match self {
            Target::Unknown => None,
            Target::Direct => Some(consts::P_MS_DIRECT),
            Target::Remote => Some(consts::P_MS_REMOTE),
        }
    }
}

struct MuxInner {
    confirmed_target: Target,
    latest_target: Target,
    in_flight: Option<Arc<SendTask>>,
}

/// Serializing request router for a single device
pub struct SiTargetMultiplexer {
    device: Arc<dyn SiDevice>,
    inner: Arc<StdMutex<MuxInner>>,
    queue: mpsc::UnboundedSender<Arc<SendTask>>,
    events: broadcast::Sender<SiMessage>,
    span: tracing::Span,
}

impl SiTargetMultiplexer {
    /// Build a multiplexer over `device` and start its worker tasks
    pub fn new(device: Arc<dyn SiDevice>) -> Arc<Self> {
        let span = tracing::info_span!("multiplexer", device = device.ident());
        let inner = Arc::new(StdMutex::new(MuxInner {
            confirmed_target: Target::Unknown,
            latest_target: Target::Unknown,
            in_flight: None,
        }));
        let (queue, queue_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(64);

        let mux = Arc::new(SiTargetMultiplexer {
            device: Arc::clone(&device),
            inner: Arc::clone(&inner),
            queue,
            events: events.clone(),
            span: span.clone(),
        });

        tokio::spawn(
            Self::drive_queue(Arc::clone(&device), Arc::clone(&inner), queue_rx)
                .instrument(span.clone()),
        );
        // Subscribe before returning so no early response can be missed.
        let device_rx = device.subscribe();
        tokio::spawn(Self::receive(device_rx, inner, events).instrument(span));
        mux
    }

    /// The device this multiplexer drives
    pub fn device(&self) -> &Arc<dyn SiDevice> {
        &self.device
    }

    /// The target the station last confirmed with a SET_MS response
    pub fn target(&self) -> Target {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .confirmed_target
    }

    /// The target of the most recently enqueued request
    pub fn latest_target(&self) -> Target {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .latest_target
    }

    /// Subscribe to traffic not consumed by a queued request
    pub fn subscribe(&self) -> broadcast::Receiver<SiMessage> {
        self.events.subscribe()
    }

    /// Queue `message` for `target` and wait for its responses.
    ///
    /// A switch command is inserted first when `target` differs from the
    /// latest requested target. Passing [`Target::Unknown`] sends without
    /// switching.
    pub async fn send_message(
        &self,
        target: Target,
        message: SiMessage,
        expected_responses: usize,
        timeout: Duration,
    ) -> Result<Vec<Vec<u8>>, LinkError> {
        let (task, outcome) = SendTask::new(message, expected_responses);
        {
            let _guard = self.span.enter();
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(parameter) = target.ms_parameter() {
                if inner.latest_target != target {
                    tracing::debug!(?target, "switching target");
                    let (switch, switch_outcome) = SendTask::new(
                        SiMessage::command(consts::cmd::SET_MS, vec![parameter]),
                        1,
                    );
                    switch.start_timer(timeout);
                    inner.latest_target = target;
                    let _ = self.queue.send(switch);
                    // A failed switch leaves the station on its old target;
                    // roll back so the next send issues SET_MS again.
                    let shared = Arc::clone(&self.inner);
                    tokio::spawn(async move {
                        if !matches!(switch_outcome.await, Ok(Ok(_))) {
                            let mut inner =
                                shared.lock().unwrap_or_else(|e| e.into_inner());
                            if inner.latest_target == target
                                && inner.confirmed_target != target
                            {
                                tracing::warn!(?target, "target switch failed");
                                inner.latest_target = inner.confirmed_target;
                            }
                        }
                    });
                }
            }
            task.start_timer(timeout);
            let _ = self.queue.send(task);
        }
        outcome
            .await
            .map_err(|_| LinkError::Device("request queue closed".to_string()))?
    }

    async fn drive_queue(
        device: Arc<dyn SiDevice>,
        inner: Arc<StdMutex<MuxInner>>,
        mut queue_rx: mpsc::UnboundedReceiver<Arc<SendTask>>,
    ) {
        while let Some(task) = queue_rx.recv().await {
            // Tasks can settle (time out) while still queued.
            if task.is_settled() {
                continue;
            }
            task.mark_sending();
            let rendered = match render(task.message()) {
                Ok(rendered) => rendered,
                Err(e) => {
                    task.fail(LinkError::Device(e.to_string()));
                    continue;
                }
            };
            inner.lock().unwrap_or_else(|e| e.into_inner()).in_flight = Some(Arc::clone(&task));
            tracing::debug!(message = %task.message(), "sending");
            if let Err(e) = device.send(&rendered).await {
                tracing::warn!(error = %e, "device send failed");
                task.fail(LinkError::Device(e.to_string()));
                inner.lock().unwrap_or_else(|e| e.into_inner()).in_flight = None;
                continue;
            }
            task.mark_sent();
            if task.expected_responses() == 0 {
                task.succeed();
            } else {
                task.settled().await;
            }
            inner.lock().unwrap_or_else(|e| e.into_inner()).in_flight = None;
        }
    }

    async fn receive(
        mut rx: broadcast::Receiver<Vec<u8>>,
        inner: Arc<StdMutex<MuxInner>>,
        events: broadcast::Sender<SiMessage>,
    ) {
        let mut buffer: Vec<u8> = Vec::new();
        loop {
            match rx.recv().await {
                Ok(bytes) => {
                    buffer.extend_from_slice(&bytes);
                    let (messages, remainder) = parse_all(&buffer);
                    let remainder = remainder.to_vec();
                    buffer = remainder;
                    for message in messages {
                        Self::dispatch(&inner, &events, message);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "receive channel lagged, dropping buffered bytes");
                    buffer.clear();
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::debug!("device receive channel closed");
                    let in_flight = inner
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .in_flight
                        .take();
                    if let Some(task) = in_flight {
                        task.fail(LinkError::Device("device closed".to_string()));
                    }
                    return;
                }
            }
        }
    }

    fn dispatch(
        inner: &Arc<StdMutex<MuxInner>>,
        events: &broadcast::Sender<SiMessage>,
        message: SiMessage,
    ) {
        let in_flight = inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .in_flight
            .clone();
        match &message {
            SiMessage::Mode(mode) if *mode == consts::NAK => {
                tracing::debug!("received NAK");
                if let Some(task) = in_flight {
                    if !task.is_settled() {
                        task.fail(LinkError::Nak);
                        return;
                    }
                }
                let _ = events.send(message);
            }
            SiMessage::Mode(_) => {
                // ACK and WAKEUP carry no routing information.
                let _ = events.send(message);
            }
            SiMessage::Command {
                command,
                parameters,
            } => {
                if *command == consts::cmd::SET_MS {
                    let mut inner = inner.lock().unwrap_or_else(|e| e.into_inner());
                    inner.confirmed_target = inner.latest_target;
                }
                if let Some(task) = in_flight {
                    // Sending counts too: bytes can come back before the
                    // writer task records completion of the write.
                    if matches!(
                        task.state(),
                        SendTaskState::Sending | SendTaskState::Sent
                    ) {
                        task.add_response(parameters.clone());
                        return;
                    }
                }
                tracing::debug!(message = %message, "unsolicited message");
                let _ = events.send(message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::fake::FakeSiDevice;
    use pretty_assertions::assert_eq;

    fn echoing_device() -> Arc<FakeSiDevice> {
        Arc::new(FakeSiDevice::new(|message| match message {
            SiMessage::Command {
                command,
                parameters,
            } => {
                let mut response = vec![0x00, 0x00];
                response.extend_from_slice(parameters);
                vec![SiMessage::command(*command, response)]
            }
            SiMessage::Mode(_) => Vec::new(),
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_switches_target_once() {
        let device = echoing_device();
        let mux = SiTargetMultiplexer::new(device.clone() as Arc<dyn SiDevice>);
        for _ in 0..2 {
            let responses = mux
                .send_message(
                    Target::Direct,
                    SiMessage::command(consts::cmd::GET_TIME, vec![]),
                    1,
                    Duration::from_secs(10),
                )
                .await
                .unwrap();
            assert_eq!(responses, vec![vec![0x00, 0x00]]);
        }
        let sent = device.sent_messages();
        assert_eq!(
            sent,
            vec![
                SiMessage::command(consts::cmd::SET_MS, vec![consts::P_MS_DIRECT]),
                SiMessage::command(consts::cmd::GET_TIME, vec![]),
                SiMessage::command(consts::cmd::GET_TIME, vec![]),
            ]
        );
        assert_eq!(mux.target(), Target::Direct);
    }

    #[tokio::test(start_paused = true)]
    async fn test_switches_again_for_other_target() {
        let device = echoing_device();
        let mux = SiTargetMultiplexer::new(device.clone() as Arc<dyn SiDevice>);
        mux.send_message(
            Target::Direct,
            SiMessage::command(consts::cmd::GET_TIME, vec![]),
            1,
            Duration::from_secs(10),
        )
        .await
        .unwrap();
        mux.send_message(
            Target::Remote,
            SiMessage::command(consts::cmd::GET_TIME, vec![]),
            1,
            Duration::from_secs(10),
        )
        .await
        .unwrap();
        let switches: Vec<SiMessage> = device
            .sent_messages()
            .into_iter()
            .filter(|message| {
                matches!(
                    message,
                    SiMessage::Command { command, .. } if *command == consts::cmd::SET_MS
                )
            })
            .collect();
        assert_eq!(
            switches,
            vec![
                SiMessage::command(consts::cmd::SET_MS, vec![consts::P_MS_DIRECT]),
                SiMessage::command(consts::cmd::SET_MS, vec![consts::P_MS_REMOTE]),
            ]
        );
        assert_eq!(mux.target(), Target::Remote);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_target_sends_without_switching() {
        let device = echoing_device();
        let mux = SiTargetMultiplexer::new(device.clone() as Arc<dyn SiDevice>);
        mux.send_message(
            Target::Unknown,
            SiMessage::command(consts::cmd::GET_TIME, vec![]),
            1,
            Duration::from_secs(10),
        )
        .await
        .unwrap();
        assert_eq!(
            device.sent_messages(),
            vec![SiMessage::command(consts::cmd::GET_TIME, vec![])]
        );
        assert_eq!(mux.target(), Target::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_on_silence() {
        let device = Arc::new(FakeSiDevice::silent());
        let mux = SiTargetMultiplexer::new(device.clone() as Arc<dyn SiDevice>);
        let result = mux
            .send_message(
                Target::Unknown,
                SiMessage::command(consts::cmd::GET_TIME, vec![]),
                1,
                Duration::from_secs(10),
            )
            .await;
        assert_eq!(result, Err(LinkError::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nak_fails_in_flight_task() {
        let device = Arc::new(FakeSiDevice::new(|_| vec![SiMessage::Mode(consts::NAK)]));
        let mux = SiTargetMultiplexer::new(device.clone() as Arc<dyn SiDevice>);
        let result = mux
            .send_message(
                Target::Unknown,
                SiMessage::command(consts::cmd::GET_TIME, vec![]),
                1,
                Duration::from_secs(10),
            )
            .await;
        assert_eq!(result, Err(LinkError::Nak));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_switch_is_reissued_on_next_send() {
        // The station answers everything except SET_MS, so switch tasks
        // time out and the device never actually changes target.
        let device = Arc::new(FakeSiDevice::new(|message| match message {
            SiMessage::Command {
                command,
                parameters,
            } if *command != consts::cmd::SET_MS => {
                let mut response = vec![0x00, 0x00];
                response.extend_from_slice(parameters);
                vec![SiMessage::command(*command, response)]
            }
            _ => Vec::new(),
        }));
        let mux = SiTargetMultiplexer::new(device.clone() as Arc<dyn SiDevice>);
        for _ in 0..2 {
            let result = mux
                .send_message(
                    Target::Direct,
                    SiMessage::command(consts::cmd::GET_TIME, vec![]),
                    1,
                    Duration::from_secs(10),
                )
                .await;
            assert_eq!(result, Err(LinkError::Timeout));
            // Let the rollback observe the failed switch.
            tokio::time::sleep(Duration::from_millis(1)).await;
            assert_eq!(mux.latest_target(), Target::Unknown);
        }
        let switches = device
            .sent_messages()
            .into_iter()
            .filter(|message| {
                matches!(
                    message,
                    SiMessage::Command { command, .. } if *command == consts::cmd::SET_MS
                )
            })
            .count();
        assert_eq!(switches, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsolicited_messages_are_published() {
        let device = Arc::new(FakeSiDevice::silent());
        let mux = SiTargetMultiplexer::new(device.clone() as Arc<dyn SiDevice>);
        let mut events = mux.subscribe();
        let punch = SiMessage::command(consts::cmd::TRANS_REC, vec![0x01, 0x02]);
        device.inject(&punch);
        let received = events.recv().await.unwrap();
        assert_eq!(received, punch);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_runs_tasks_in_order() {
        let device = echoing_device();
        let mux = SiTargetMultiplexer::new(device.clone() as Arc<dyn SiDevice>);
        let first = mux.send_message(
            Target::Unknown,
            SiMessage::command(consts::cmd::GET_SYS_VAL, vec![0x00, 0x01]),
            1,
            Duration::from_secs(10),
        );
        let second = mux.send_message(
            Target::Unknown,
            SiMessage::command(consts::cmd::GET_TIME, vec![]),
            1,
            Duration::from_secs(10),
        );
        let (first, second) = tokio::join!(first, second);
        first.unwrap();
        second.unwrap();
        assert_eq!(
            device.sent_messages(),
            vec![
                SiMessage::command(consts::cmd::GET_SYS_VAL, vec![0x00, 0x01]),
                SiMessage::command(consts::cmd::GET_TIME, vec![]),
            ]
        );
    }
}
