//! Backup log retrieval
//!
//! Stations append an 8-byte record to backup memory for every punch. This
//! module drains that log over an unreliable link: the write pointer and
//! overflow flag are acquired with retries, then the log is read in
//! adaptively sized chunks that shrink when the link misbehaves. There is
//! no "done" signal from the hardware; the only end condition is reaching
//! the previously read write pointer.

use std::time::Duration;

use byteorder::{BigEndian, ByteOrder};
use chrono::NaiveDateTime;

use crate::protocol::{arr2card_number, arr2date, consts, SiMessage};

use super::error::StationError;
use super::station::SiStation;

/// First backup record address
pub const BACKUP_BASE_ADDRESS: u32 = 0x0100;
/// Address at which the log wraps back to the base
pub const BACKUP_MAX_ADDRESS: u32 = 0x20_0000;
/// Initial chunk size for backup reads
pub const BACKUP_BLOCK_SIZE: u32 = 128;

const POINTER_ATTEMPTS: u32 = 10;
const POINTER_RETRY_DELAY: Duration = Duration::from_millis(500);
const OVERFLOW_ATTEMPTS: u32 = 5;
const RETRY_DELAY: Duration = Duration::from_millis(100);
const RETRIES_PER_BLOCK_SIZE: u32 = 5;
const POWER_OFF_ATTEMPTS: u32 = 5;
const POWER_OFF_DELAY: Duration = Duration::from_millis(250);

/// Options for a backup read
#[derive(Debug, Clone)]
pub struct BackupReadOptions {
    /// Turn the station off after reading
    pub power_off: bool,
    /// First record address, normally [`BACKUP_BASE_ADDRESS`]
    pub base_address: u32,
    /// Wrap address, normally [`BACKUP_MAX_ADDRESS`]
    pub max_address: u32,
    /// Starting chunk size, normally [`BACKUP_BLOCK_SIZE`]
    pub initial_block_size: u32,
}

impl Default for BackupReadOptions {
    fn default() -> Self {
        BackupReadOptions {
            power_off: true,
            base_address: BACKUP_BASE_ADDRESS,
            max_address: BACKUP_MAX_ADDRESS,
            initial_block_size: BACKUP_BLOCK_SIZE,
        }
    }
}

/// One decoded punch record
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BackupRecord {
    /// Code number of the punching station
    pub code: u16,
    /// Card number, `None` when undecodable
    pub card_number: Option<u32>,
    /// Punch timestamp, `None` when undecodable
    pub date: Option<NaiveDateTime>,
}

/// Progress of a running backup read
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum BackupProgress {
    /// The read has started
    Started,
    /// Part of the log has been read
    Progress {
        /// Completion estimate, 0 to 100
        percent: f64,
    },
    /// The read finished
    Completed {
        /// Number of records retrieved
        records: usize,
    },
    /// The read failed
    Errored,
}

fn decode_record(code: u16, bytes: &[u8]) -> BackupRecord {
    let card_number =
        arr2card_number(&[Some(bytes[2]), Some(bytes[1]), Some(bytes[0])]);
    let date_arr = [
        bytes[3] >> 2,
        ((bytes[3] & 0x03) << 2) | ((bytes[4] >> 6) & 0x03),
        (bytes[4] >> 1) & 0x1f,
        bytes[4] & 0x01,
        bytes[5],
        bytes[6],
        bytes[7],
    ];
    BackupRecord {
        code,
        card_number,
        date: arr2date(&date_arr, None),
    }
}

impl SiStation {
    /// Read the whole backup log with default addressing
    pub async fn read_backup(&self) -> Result<Vec<BackupRecord>, StationError> {
        self.read_backup_with(&BackupReadOptions::default()).await
    }

    /// Read the whole backup log
    pub async fn read_backup_with(
        &self,
        options: &BackupReadOptions,
    ) -> Result<Vec<BackupRecord>, StationError> {
        self.emit_progress(BackupProgress::Started);
        let outcome = self.read_backup_inner(options).await;

        // The station shows a confirmation signal regardless of outcome.
        if let Err(e) = self
            .send_message(SiMessage::command(consts::cmd::SIGNAL, vec![0x02]), 0)
            .await
        {
            tracing::warn!(error = %e, "backup confirmation signal failed");
        }
        if options.power_off {
            tokio::time::sleep(POWER_OFF_DELAY).await;
            let mut powered_off = false;
            for _ in 0..POWER_OFF_ATTEMPTS {
                match self
                    .send_message(SiMessage::command(consts::cmd::OFF, vec![]), 1)
                    .await
                {
                    Ok(_) => {
                        powered_off = true;
                        break;
                    }
                    Err(e) => tracing::debug!(error = %e, "power off attempt failed"),
                }
            }
            if !powered_off {
                tracing::warn!("station did not confirm power off");
            }
        }

        match &outcome {
            Ok(records) => self.emit_progress(BackupProgress::Completed {
                records: records.len(),
            }),
            Err(_) => self.emit_progress(BackupProgress::Errored),
        }
        outcome
    }

    async fn read_backup_inner(
        &self,
        options: &BackupReadOptions,
    ) -> Result<Vec<BackupRecord>, StationError> {
        let pointer = self.acquire_backup_pointer().await?;
        tracing::debug!(pointer = format_args!("0x{:06x}", pointer), "backup pointer");
        self.emit_progress(BackupProgress::Progress { percent: 1.5 });

        let overflow = self.acquire_overflow_flag().await;
        tracing::debug!(overflow, "backup overflow flag");
        self.emit_progress(BackupProgress::Progress { percent: 3.0 });

        let base = options.base_address;
        let max = options.max_address;
        let mut overflow_active = overflow;
        let mut address = if overflow {
            let wrapped = pointer + 1;
            if wrapped >= max {
                base
            } else {
                wrapped
            }
        } else {
            base
        };
        let total_bytes = if overflow {
            (max - address) + pointer.saturating_sub(base)
        } else {
            pointer.saturating_sub(base)
        };

        let mut records: Vec<BackupRecord> = Vec::new();
        let mut block_size = options.initial_block_size;
        let mut retries = 0u32;
        let mut bytes_read = 0u32;
        let floor = consts::REC_LEN as u32;

        loop {
            let end = if overflow_active { max } else { pointer.min(max) };
            if address >= end {
                if overflow_active {
                    // First pass done; continue from the base up to the
                    // pointer.
                    overflow_active = false;
                    address = base;
                    continue;
                }
                break;
            }
            let request_len = block_size.min(end - address);
            let request = SiMessage::command(
                consts::cmd::GET_BACKUP,
                vec![
                    ((address >> 16) & 0xff) as u8,
                    ((address >> 8) & 0xff) as u8,
                    (address & 0xff) as u8,
                    request_len as u8,
                ],
            );
            match self.send_message(request, 1).await {
                // A response without the full 5-byte header is as useless as
                // no response; it falls through to the retry ladder below.
                Ok(responses) if responses[0].len() >= 5 => {
                    retries = 0;
                    let data = &responses[0];
                    let code = BigEndian::read_u16(&data[0..2]);
                    let echoed_address = BigEndian::read_u24(&data[2..5]);
                    let mut offset = 5;
                    while offset + consts::REC_LEN <= data.len() {
                        // Acceptance bound as the station firmware defines
                        // it: the offset includes the 5-byte header.
                        if echoed_address + offset as u32 <= pointer || overflow_active {
                            records.push(decode_record(
                                code,
                                &data[offset..offset + consts::REC_LEN],
                            ));
                        } else {
                            break;
                        }
                        offset += consts::REC_LEN;
                    }
                    address += request_len;
                    bytes_read += request_len;
                    if total_bytes > 0 {
                        self.emit_progress(BackupProgress::Progress {
                            percent: 3.0
                                + 97.0 * f64::from(bytes_read) / f64::from(total_bytes),
                        });
                    }
                }
                outcome => {
                    retries += 1;
                    match outcome {
                        Ok(_) => tracing::debug!(
                            retries,
                            block_size,
                            "truncated GET_BACKUP response"
                        ),
                        Err(e) => tracing::debug!(
                            error = %e,
                            retries,
                            block_size,
                            "backup chunk read failed"
                        ),
                    }
                    if retries < RETRIES_PER_BLOCK_SIZE {
                        tokio::time::sleep(RETRY_DELAY).await;
                        continue;
                    }
                    if block_size >= 2 * floor {
                        block_size /= 2;
                        retries = 0;
                        tracing::info!(block_size, "reducing backup block size");
                        tokio::time::sleep(RETRY_DELAY).await;
                        continue;
                    }
                    if !records.is_empty() {
                        // The readable part of the log ends here.
                        tracing::warn!(
                            records = records.len(),
                            "stopping backup read at the last readable chunk"
                        );
                        break;
                    }
                    return Err(StationError::BackupReadFailed);
                }
            }
        }
        Ok(records)
    }

    async fn acquire_backup_pointer(&self) -> Result<u32, StationError> {
        for _ in 0..POINTER_ATTEMPTS {
            match self
                .send_message(
                    SiMessage::command(consts::cmd::GET_SYS_VAL, vec![0x1c, 0x07]),
                    1,
                )
                .await
            {
                Ok(responses) => {
                    let data = &responses[0];
                    if data.len() >= 10 {
                        let pointer = (u32::from(data[3]) << 24)
                            | (u32::from(data[4]) << 16)
                            | (u32::from(data[8]) << 8)
                            | u32::from(data[9]);
                        if pointer != 0 {
                            return Ok(pointer);
                        }
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "backup pointer read failed");
                }
            }
            // Nudge the station awake before the next attempt.
            let _ = self
                .send_message(SiMessage::Mode(consts::WAKEUP), 0)
                .await;
            tokio::time::sleep(POINTER_RETRY_DELAY).await;
        }
        Err(StationError::Unreachable)
    }

    /// Read the overflow flag; failures degrade to "no overflow".
    async fn acquire_overflow_flag(&self) -> bool {
        for _ in 0..OVERFLOW_ATTEMPTS {
            match self
                .send_message(
                    SiMessage::command(consts::cmd::GET_SYS_VAL, vec![0x3d, 0x01]),
                    1,
                )
                .await
            {
                Ok(responses) => {
                    if let Some(&flag) = responses[0].get(3) {
                        return flag != 0;
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "overflow flag read failed");
                }
            }
            tokio::time::sleep(RETRY_DELAY).await;
        }
        tracing::warn!("overflow flag unavailable, assuming no overflow");
        false
    }
}
