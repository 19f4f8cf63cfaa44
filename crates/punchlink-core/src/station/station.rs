//! Station session
//!
//! A station session owns a local image of one station's 0x80-byte system
//! value memory, described by [`StationLayout`]. Reads snapshot the whole
//! region; writes go back as one SET_SYS_VAL per contiguous dirty range.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use tokio::sync::broadcast;

use crate::protocol::{arr2date, consts, date2arr, SiDateField, SiMessage};
use crate::storage::{ErasedField, IntPart, SiBool, SiEnum, SiField, SiInt, SiStorage};

use super::backup::BackupProgress;
use super::error::{LinkError, StationError};
use super::multiplexer::{SiTargetMultiplexer, Target};

/// Size of a station's system value memory
pub const STORAGE_SIZE: usize = 0x80;

/// Default per-request timeout
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Operating modes a station can be programmed to
const STATION_MODES: [(u64, &str); 6] = [
    (0x02, "Control"),
    (0x03, "Start"),
    (0x04, "Finish"),
    (0x05, "Readout"),
    (0x07, "Clear"),
    (0x0a, "Check"),
];

/// Known station hardware models
const STATION_MODELS: [(u64, &str); 5] = [
    (0x8115, "BSF5"),
    (0x8117, "BSF7"),
    (0x8118, "BSF8"),
    (0x9197, "BSM7"),
    (0x9198, "BSM8"),
];

/// Field descriptors for the system value memory.
///
/// Offsets follow the BSx7/BSx8 firmware layout. Multi-byte integers are
/// stored big endian in the image.
pub struct StationLayout {
    /// Control code number
    pub code: SiInt,
    /// Operating mode
    pub mode: SiEnum,
    /// Feedback beep on punch
    pub beeps: SiBool,
    /// Feedback flash on punch
    pub flashes: SiBool,
    /// Autosend punches while online
    pub auto_send: SiBool,
    /// Extended protocol enabled
    pub extended_protocol: SiBool,
    /// Device serial number
    pub serial_number: SiInt,
    /// Firmware version
    pub firmware_version: SiInt,
    /// Firmware build date
    pub build_date: SiDateField,
    /// Hardware model
    pub device_model: SiEnum,
    /// Backup memory size in KiB
    pub memory_size: SiInt,
    /// Date of the last battery change
    pub battery_date: SiDateField,
    /// Battery capacity
    pub battery_capacity: SiInt,
    /// Consumed battery charge
    pub battery_state: SiInt,
    /// Next write address of the backup log
    pub backup_pointer: SiInt,
    /// SI-Card 6 punch capacity mode
    pub si_card6_mode: SiInt,
    /// Nonzero when the backup log has wrapped
    pub memory_overflow: SiInt,
    /// Time of the last configuration write
    pub last_write_date: SiDateField,
    /// Auto-off timeout in minutes
    pub auto_off_timeout: SiInt,
    /// Display refresh rate
    pub refresh_rate: SiInt,
    /// Power mode code
    pub power_mode: SiInt,
    /// Active-mode interval, in units of 32 ms
    pub interval: SiInt,
    /// Standby-mode interval, in units of 32 ms
    pub standby_interval: SiInt,
    /// Competition/training program byte
    pub program: SiInt,
    /// Handshake mode enabled
    pub handshake: SiBool,
    /// Sprint 4 ms timing mode
    pub sprint4ms: SiBool,
    /// Access restricted to password holders
    pub password_only: SiBool,
    /// Stop punching when the backup memory is full
    pub stop_on_full_backup: SiBool,
    /// Automatic card readout
    pub auto_readout: SiBool,
    /// Packed sleep weekday byte
    pub sleep_day: SiInt,
    /// Sleep time, seconds relative to half-day
    pub sleep_seconds: SiInt,
    /// Working duration in minutes
    pub working_minutes: SiInt,
}

impl StationLayout {
    /// The BSx7/BSx8 layout
    pub fn new() -> Self {
        StationLayout {
            code: SiInt::new(vec![IntPart::bits(0x73, 6, 8), IntPart::whole_byte(0x72)]),
            mode: SiEnum::new(SiInt::from_offsets(&[0x71]), STATION_MODES.to_vec()),
            beeps: SiBool::new(0x73, 2),
            flashes: SiBool::new(0x73, 0),
            auto_send: SiBool::new(0x74, 1),
            extended_protocol: SiBool::new(0x74, 0),
            serial_number: SiInt::from_offsets(&[0x00, 0x01, 0x02, 0x03]),
            firmware_version: SiInt::from_offsets(&[0x05, 0x06, 0x07]),
            build_date: SiDateField::new(vec![0x08, 0x09, 0x0a]),
            device_model: SiEnum::new(
                SiInt::from_offsets(&[0x0b, 0x0c]),
                STATION_MODELS.to_vec(),
            ),
            memory_size: SiInt::from_offsets(&[0x0d]),
            battery_date: SiDateField::new(vec![0x15, 0x16, 0x17]),
            battery_capacity: SiInt::from_offsets(&[0x19, 0x1a]),
            battery_state: SiInt::from_offsets(&[0x34, 0x35, 0x36, 0x37]),
            backup_pointer: SiInt::from_offsets(&[0x1c, 0x1d, 0x21, 0x22]),
            si_card6_mode: SiInt::from_offsets(&[0x33]),
            memory_overflow: SiInt::from_offsets(&[0x3d]),
            last_write_date: SiDateField::new(vec![0x75, 0x76, 0x77, 0x78, 0x79, 0x7a]),
            auto_off_timeout: SiInt::from_offsets(&[0x7e, 0x7f]),
            refresh_rate: SiInt::from_offsets(&[0x10]),
            power_mode: SiInt::from_offsets(&[0x11]),
            interval: SiInt::from_offsets(&[0x48, 0x49]),
            standby_interval: SiInt::from_offsets(&[0x4a, 0x4b]),
            program: SiInt::from_offsets(&[0x70]),
            handshake: SiBool::new(0x74, 2),
            sprint4ms: SiBool::new(0x74, 3),
            password_only: SiBool::new(0x74, 4),
            stop_on_full_backup: SiBool::new(0x74, 5),
            auto_readout: SiBool::new(0x74, 7),
            sleep_day: SiInt::from_offsets(&[0x7b]),
            sleep_seconds: SiInt::from_offsets(&[0x7c, 0x7d]),
            working_minutes: SiInt::from_offsets(&[0x7e, 0x7f]),
        }
    }

    /// Look up a field by name for string-based access
    pub fn field(&self, name: &str) -> Option<&dyn ErasedField> {
        Some(match name {
            "code" => &self.code,
            "mode" => &self.mode,
            "beeps" => &self.beeps,
            "flashes" => &self.flashes,
            "autoSend" => &self.auto_send,
            "extendedProtocol" => &self.extended_protocol,
            "serialNumber" => &self.serial_number,
            "firmwareVersion" => &self.firmware_version,
            "buildDate" => &self.build_date,
            "deviceModel" => &self.device_model,
            "memorySize" => &self.memory_size,
            "batteryDate" => &self.battery_date,
            "batteryCapacity" => &self.battery_capacity,
            "batteryState" => &self.battery_state,
            "backupPointer" => &self.backup_pointer,
            "siCard6Mode" => &self.si_card6_mode,
            "memoryOverflow" => &self.memory_overflow,
            "lastWriteDate" => &self.last_write_date,
            "autoOffTimeout" => &self.auto_off_timeout,
            "refreshRate" => &self.refresh_rate,
            "powerMode" => &self.power_mode,
            "interval" => &self.interval,
            "standbyInterval" => &self.standby_interval,
            "program" => &self.program,
            "handshake" => &self.handshake,
            "sprint4ms" => &self.sprint4ms,
            "passwordOnly" => &self.password_only,
            "stopOnFullBackup" => &self.stop_on_full_backup,
            "autoReadout" => &self.auto_readout,
            "sleepDay" => &self.sleep_day,
            "sleepSeconds" => &self.sleep_seconds,
            "workingMinutes" => &self.working_minutes,
            _ => return None,
        })
    }
}

impl Default for StationLayout {
    fn default() -> Self {
        StationLayout::new()
    }
}

/// A session with one station behind a multiplexer target
pub struct SiStation {
    mux: Arc<SiTargetMultiplexer>,
    target: Target,
    layout: StationLayout,
    storage: SiStorage,
    progress: broadcast::Sender<BackupProgress>,
}

impl SiStation {
    fn new(mux: Arc<SiTargetMultiplexer>, target: Target) -> Self {
        let (progress, _) = broadcast::channel(64);
        SiStation {
            mux,
            target,
            layout: StationLayout::new(),
            storage: SiStorage::new(STORAGE_SIZE),
            progress,
        }
    }

    /// Session with the directly attached station
    pub fn direct(mux: Arc<SiTargetMultiplexer>) -> Self {
        Self::new(mux, Target::Direct)
    }

    /// Session with the coupled station behind the direct one
    pub fn remote(mux: Arc<SiTargetMultiplexer>) -> Self {
        Self::new(mux, Target::Remote)
    }

    /// Identifier for logs, combining target and device
    pub fn ident(&self) -> String {
        format!("{:?}-{}", self.target, self.mux.device().ident())
    }

    /// The multiplexer target this session addresses
    pub fn target(&self) -> Target {
        self.target
    }

    /// The field layout of the system value memory
    pub fn layout(&self) -> &StationLayout {
        &self.layout
    }

    /// The local system value image
    pub fn storage(&self) -> &SiStorage {
        &self.storage
    }

    /// Subscribe to backup read progress events
    pub fn subscribe_progress(&self) -> broadcast::Receiver<BackupProgress> {
        self.progress.subscribe()
    }

    pub(crate) fn emit_progress(&self, event: BackupProgress) {
        let _ = self.progress.send(event);
    }

    pub(crate) async fn send_message(
        &self,
        message: SiMessage,
        expected_responses: usize,
    ) -> Result<Vec<Vec<u8>>, LinkError> {
        self.mux
            .send_message(self.target, message, expected_responses, DEFAULT_SEND_TIMEOUT)
            .await
    }

    /// Snapshot the whole system value memory into local storage
    pub async fn read_info(&mut self) -> Result<(), StationError> {
        let responses = self
            .send_message(
                SiMessage::command(consts::cmd::GET_SYS_VAL, vec![0x00, STORAGE_SIZE as u8]),
                1,
            )
            .await?;
        let parameters = &responses[0];
        // Response: two station code bytes, the echoed offset, then the data.
        if parameters.len() < 3 + STORAGE_SIZE {
            return Err(StationError::UnexpectedResponse(format!(
                "GET_SYS_VAL returned {} bytes",
                parameters.len()
            )));
        }
        self.storage
            .splice(0x00, STORAGE_SIZE, &parameters[3..3 + STORAGE_SIZE])?;
        Ok(())
    }

    /// Read a typed field from the local image
    pub fn get_field<F: SiField>(&self, field: &F) -> Option<F::Value> {
        field.extract_value(&self.storage)
    }

    /// Write a typed field into the local image
    pub fn set_field<F: SiField>(
        &mut self,
        field: &F,
        value: &F::Value,
    ) -> Result<(), StationError> {
        field.update(&mut self.storage, value)?;
        Ok(())
    }

    /// Read a field by name as its display string
    pub fn get_info(&self, name: &str) -> Result<Option<String>, StationError> {
        let field = self
            .layout
            .field(name)
            .ok_or_else(|| StationError::UnknownField(name.to_string()))?;
        match field.extract_string(&self.storage) {
            None => Ok(None),
            Some(result) => Ok(Some(result?)),
        }
    }

    /// Parse and write a field by name
    pub fn set_info(&mut self, name: &str, value: &str) -> Result<(), StationError> {
        let field = self
            .layout
            .field(name)
            .ok_or_else(|| StationError::UnknownField(name.to_string()))?;
        field.update_string(&mut self.storage, value)?;
        Ok(())
    }

    /// Push local modifications to the station.
    ///
    /// Re-reads the station's actual memory first and writes only the bytes
    /// that differ from the local image, then keeps the local image.
    pub async fn write_changes(&mut self) -> Result<(), StationError> {
        let desired = self.storage.clone();
        self.read_info().await?;
        let actual = self.storage.clone();
        self.write_diff(&actual, &desired).await?;
        self.storage = desired;
        Ok(())
    }

    /// Read, modify with `change`, and write back the difference
    pub async fn atomically(
        &mut self,
        change: impl FnOnce(&mut SiStorage, &StationLayout),
    ) -> Result<(), StationError> {
        self.read_info().await?;
        let old = self.storage.clone();
        {
            let (storage, layout) = (&mut self.storage, &self.layout);
            change(storage, layout);
        }
        let new = self.storage.clone();
        self.write_diff(&old, &new).await
    }

    async fn write_diff(&self, old: &SiStorage, new: &SiStorage) -> Result<(), StationError> {
        let mut ranges: Vec<(usize, usize)> = Vec::new();
        for offset in 0..new.len() {
            // Unknown bytes in the new image cannot be written.
            let dirty = match new.byte(offset) {
                Some(byte) => old.byte(offset) != Some(byte),
                None => false,
            };
            if !dirty {
                continue;
            }
            match ranges.last_mut() {
                Some(last) if last.1 == offset => last.1 = offset + 1,
                _ => ranges.push((offset, offset + 1)),
            }
        }
        for (start, end) in ranges {
            let mut parameters = Vec::with_capacity(1 + end - start);
            parameters.push(start as u8);
            for offset in start..end {
                // Known by construction of the dirty ranges.
                parameters.extend(new.byte(offset));
            }
            tracing::debug!(start, end, "writing system value range");
            let responses = self
                .send_message(
                    SiMessage::command(consts::cmd::SET_SYS_VAL, parameters.clone()),
                    1,
                )
                .await?;
            let echoed = responses[0].get(2).copied();
            if echoed != Some(start as u8) {
                tracing::warn!(
                    expected = start,
                    echoed = ?echoed,
                    "SET_SYS_VAL echoed an unexpected offset"
                );
            }
        }
        Ok(())
    }

    /// Read the station's clock
    pub async fn get_time(&self) -> Result<Option<NaiveDateTime>, StationError> {
        let responses = self
            .send_message(SiMessage::command(consts::cmd::GET_TIME, vec![]), 1)
            .await?;
        let parameters = &responses[0];
        if parameters.len() < 2 {
            return Err(StationError::UnexpectedResponse(
                "short GET_TIME response".to_string(),
            ));
        }
        Ok(arr2date(&parameters[2..], None))
    }

    /// Set the station's clock, returning the time it confirms
    pub async fn set_time(
        &self,
        new_time: NaiveDateTime,
    ) -> Result<Option<NaiveDateTime>, StationError> {
        let responses = self
            .send_message(
                SiMessage::command(consts::cmd::SET_TIME, date2arr(new_time).to_vec()),
                1,
            )
            .await?;
        let parameters = &responses[0];
        if parameters.len() < 2 {
            return Err(StationError::UnexpectedResponse(
                "short SET_TIME response".to_string(),
            ));
        }
        Ok(arr2date(&parameters[2..], None))
    }

    /// Beep and flash `count` times, verifying the echoed count
    pub async fn signal(&self, count: u8) -> Result<(), StationError> {
        let count = count.max(1);
        let responses = self
            .send_message(SiMessage::command(consts::cmd::SIGNAL, vec![count]), 1)
            .await?;
        if responses[0].get(2).copied() != Some(count) {
            return Err(StationError::UnexpectedResponse(format!(
                "station acknowledged a different beep count than {}",
                count
            )));
        }
        Ok(())
    }

    /// Turn the station off. USB-powered stations ignore this.
    pub async fn power_off(&self) -> Result<(), StationError> {
        self.send_message(SiMessage::command(consts::cmd::OFF, vec![]), 0)
            .await?;
        Ok(())
    }
}
