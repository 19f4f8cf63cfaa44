//! Serial port device
//!
//! Opens an SI station's USB serial port and pumps received bytes into a
//! broadcast channel. Reads run on a background task; writes go through an
//! async mutex so concurrent senders cannot interleave partial frames.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::sync::Arc;

use async_trait::async_trait;
use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{broadcast, Mutex};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use super::{DeviceError, DeviceState, SiDevice};

/// Baud rate SI stations use in extended protocol mode
pub const DEFAULT_BAUD_RATE: u32 = 38_400;

const READ_BUFFER_SIZE: usize = 4096;
const BROADCAST_CAPACITY: usize = 64;

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Product name (if available)
    pub product: Option<String>,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (vid, pid, product) = match info.port_type {
            SerialPortType::UsbPort(usb_info) => {
                (Some(usb_info.vid), Some(usb_info.pid), usb_info.product)
            }
            _ => (None, None, None),
        };

        Self {
            name: info.port_name,
            vid,
            pid,
            product,
        }
    }
}

/// SportIdent's USB vendor ID
const SPORTIDENT_VID: u16 = 0x10c4;
/// Product ID of the SRR dongle and USB station interfaces
const SPORTIDENT_PID: u16 = 0x800a;

impl PortInfo {
    /// Whether the port looks like SI hardware, by USB id
    pub fn is_si_device(&self) -> bool {
        self.vid == Some(SPORTIDENT_VID) && self.pid == Some(SPORTIDENT_PID)
    }
}

fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    if let Some(rest) = basename.strip_prefix("ttyACM") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (0, num, basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("ttyUSB") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (1, num, basename.to_string());
    }
    (2, 0, basename.to_string())
}

/// List all available serial ports in a deterministic order
pub fn list_ports() -> Vec<PortInfo> {
    let mut map: HashMap<String, PortInfo> = HashMap::new();
    for info in serialport::available_ports().unwrap_or_default() {
        let port = PortInfo::from(info);
        map.entry(port.name.clone()).or_insert(port);
    }
    let mut ports: Vec<PortInfo> = map.into_values().collect();
    ports.sort_by_key(|port| port_sort_key(&port.name));
    ports
}

/// List the available ports that identify as SI hardware
pub fn list_si_ports() -> Vec<PortInfo> {
    list_ports()
        .into_iter()
        .filter(PortInfo::is_si_device)
        .collect()
}

/// An SI device reached over a serial port
pub struct SerialSiDevice {
    ident: String,
    state: Arc<StdMutex<DeviceState>>,
    incoming: broadcast::Sender<Vec<u8>>,
    writer: Mutex<WriteHalf<SerialStream>>,
    read_task: StdMutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SerialSiDevice {
    /// Open `path` at the default SI baud rate
    pub fn open(path: &str) -> Result<Arc<Self>, DeviceError> {
        Self::open_with_baud_rate(path, DEFAULT_BAUD_RATE)
    }

    /// Open `path` at an explicit baud rate
    pub fn open_with_baud_rate(path: &str, baud_rate: u32) -> Result<Arc<Self>, DeviceError> {
        tracing::info!(path, baud_rate, "opening serial device");
        let mut stream = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| DeviceError::Serial(e.to_string()))?;

        // Opening a port can toggle DTR; assert both control lines so the
        // station keeps the connection up. Not every adapter supports this.
        if let Err(e) = stream.write_data_terminal_ready(true) {
            tracing::debug!(path, error = %e, "failed to set DTR high");
        }
        if let Err(e) = stream.write_request_to_send(true) {
            tracing::debug!(path, error = %e, "failed to set RTS high");
        }

        let (reader, writer) = tokio::io::split(stream);
        let (incoming, _) = broadcast::channel(BROADCAST_CAPACITY);
        let state = Arc::new(StdMutex::new(DeviceState::Opened));

        let device = Arc::new(SerialSiDevice {
            ident: path.to_string(),
            state: Arc::clone(&state),
            incoming: incoming.clone(),
            writer: Mutex::new(writer),
            read_task: StdMutex::new(None),
        });

        let read_task = tokio::spawn(Self::read_pump(
            path.to_string(),
            reader,
            incoming,
            state,
        ));
        *device.read_task.lock().unwrap_or_else(|e| e.into_inner()) = Some(read_task);
        Ok(device)
    }

    async fn read_pump(
        path: String,
        mut reader: ReadHalf<SerialStream>,
        incoming: broadcast::Sender<Vec<u8>>,
        state: Arc<StdMutex<DeviceState>>,
    ) {
        let mut buffer = [0u8; READ_BUFFER_SIZE];
        loop {
            match reader.read(&mut buffer).await {
                Ok(0) => {
                    tracing::info!(path, "serial device closed");
                    *state.lock().unwrap_or_else(|e| e.into_inner()) = DeviceState::Closed;
                    return;
                }
                Ok(n) => {
                    tracing::trace!(path, bytes = n, "received");
                    // Send fails only when nobody listens; that is fine.
                    let _ = incoming.send(buffer[..n].to_vec());
                }
                Err(e) => {
                    tracing::warn!(path, error = %e, "serial read failed");
                    *state.lock().unwrap_or_else(|e| e.into_inner()) = DeviceState::Errored;
                    return;
                }
            }
        }
    }

    /// Stop the read task and mark the device closed
    pub fn close(&self) {
        if let Some(task) = self
            .read_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = DeviceState::Closed;
        tracing::info!(path = %self.ident, "serial device closed");
    }
}

impl Drop for SerialSiDevice {
    fn drop(&mut self) {
        if let Some(task) = self
            .read_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
    }
}

#[async_trait]
impl SiDevice for SerialSiDevice {
    fn ident(&self) -> &str {
        &self.ident
    }

    fn state(&self) -> DeviceState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<u8>> {
        self.incoming.subscribe()
    }

    async fn send(&self, data: &[u8]) -> Result<(), DeviceError> {
        if self.state() != DeviceState::Opened {
            return Err(DeviceError::NotOpen);
        }
        tracing::trace!(path = %self.ident, bytes = data.len(), "sending");
        let mut writer = self.writer.lock().await;
        writer.write_all(data).await?;
        writer.flush().await?;
        Ok(())
    }
}
