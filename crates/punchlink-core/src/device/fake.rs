//! Scripted in-process device for tests
//!
//! Parses outgoing bytes back into messages, records them, and feeds the
//! handler's replies into the receive channel. Returning no replies lets a
//! test exercise timeouts; replying with a NAK mode message exercises the
//! rejection path.

use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::protocol::{parse_all, render, SiMessage};

use super::{DeviceError, DeviceState, SiDevice};

type Handler = Box<dyn FnMut(&SiMessage) -> Vec<SiMessage> + Send>;

pub(crate) struct FakeSiDevice {
    incoming: broadcast::Sender<Vec<u8>>,
    handler: StdMutex<Handler>,
    sent: StdMutex<Vec<SiMessage>>,
    pending: StdMutex<Vec<u8>>,
}

impl FakeSiDevice {
    pub(crate) fn new(handler: impl FnMut(&SiMessage) -> Vec<SiMessage> + Send + 'static) -> Self {
        let (incoming, _) = broadcast::channel(64);
        FakeSiDevice {
            incoming,
            handler: StdMutex::new(Box::new(handler)),
            sent: StdMutex::new(Vec::new()),
            pending: StdMutex::new(Vec::new()),
        }
    }

    /// A device that never answers
    pub(crate) fn silent() -> Self {
        FakeSiDevice::new(|_| Vec::new())
    }

    /// Every message sent so far, in order
    pub(crate) fn sent_messages(&self) -> Vec<SiMessage> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Push unsolicited bytes to subscribers, as if the hardware spoke first
    pub(crate) fn inject(&self, message: &SiMessage) {
        let rendered = render(message).expect("injected message must render");
        let _ = self.incoming.send(rendered);
    }
}

#[async_trait]
impl SiDevice for FakeSiDevice {
    fn ident(&self) -> &str {
        "fake"
    }

    fn state(&self) -> DeviceState {
        DeviceState::Opened
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<u8>> {
        self.incoming.subscribe()
    }

    async fn send(&self, data: &[u8]) -> Result<(), DeviceError> {
        let messages = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.extend_from_slice(data);
            let (messages, remainder) = parse_all(&pending);
            let remainder = remainder.to_vec();
            *pending = remainder;
            messages
        };
        for message in messages {
            self.sent
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(message.clone());
            let replies = {
                let mut handler = self.handler.lock().unwrap_or_else(|e| e.into_inner());
                handler(&message)
            };
            for reply in replies {
                let rendered = render(&reply).expect("scripted reply must render");
                let _ = self.incoming.send(rendered);
            }
        }
        Ok(())
    }
}
