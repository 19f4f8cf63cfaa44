//! Date and time conversions
//!
//! SI stations encode dates as packed byte arrays and times as half-day
//! second counts. Conversions here reject impossible calendar values by
//! construction, relying on chrono's checked constructors rather than
//! re-deriving the fields after the fact.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};

use super::consts;
use crate::storage::{SiField, SiStorage, StorageError};

/// Seconds in half a day. Times at or above this fall in the afternoon.
pub const SI_TIME_CUTOFF: u32 = 43_200;

fn resolve_two_digit_year(year: u8, as_of: Option<NaiveDate>) -> i32 {
    let reference = as_of.unwrap_or_else(|| Utc::now().date_naive());
    let reference_year = reference.year();
    let century = reference_year - reference_year.rem_euclid(100);
    let candidate = century + i32::from(year);
    if candidate > reference_year {
        candidate - 100
    } else {
        candidate
    }
}

/// Decode a packed SI date array of length 3, 6 or 7.
///
/// Length 3 is a plain date, length 6 adds a half-day second count and
/// length 7 adds 1/256-second subseconds. Two-digit years are resolved to
/// the most recent matching year not after `as_of` (defaulting to today).
/// Returns `None` for arrays whose fields do not form a real date.
pub fn arr2date(arr: &[u8], as_of: Option<NaiveDate>) -> Option<NaiveDateTime> {
    if !matches!(arr.len(), 3 | 6 | 7) {
        tracing::warn!(len = arr.len(), "invalid date array length");
        return None;
    }
    if arr[0] > 99 || arr[1] == 0 {
        tracing::warn!(year = arr[0], month = arr[1], "invalid date array");
        return None;
    }
    let year = resolve_two_digit_year(arr[0], as_of);
    let date = NaiveDate::from_ymd_opt(year, u32::from(arr[1]), u32::from(arr[2]))?;
    if arr.len() == 3 {
        return date.and_hms_opt(0, 0, 0);
    }
    let half_day_seconds = u32::from(u16::from_be_bytes([arr[4], arr[5]]));
    let seconds = u32::from(arr[3] & 0x01) * SI_TIME_CUTOFF + half_day_seconds;
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let datetime = date.and_hms_opt(hours, minutes, seconds % 60)?;
    if arr.len() == 7 {
        let millis = u32::from(arr[6]) * 1000 / 256;
        datetime.with_nanosecond(millis * 1_000_000)
    } else {
        Some(datetime)
    }
}

/// Encode a date into the 7-byte packed SI form.
///
/// The fourth byte carries the weekday in bits 1..4 and the am/pm flag in
/// bit 0, matching what stations report in their clock registers.
pub fn date2arr(datetime: NaiveDateTime) -> [u8; 7] {
    let seconds = datetime.num_seconds_from_midnight();
    let half_day_seconds = seconds % SI_TIME_CUTOFF;
    let pm = u8::from(seconds >= SI_TIME_CUTOFF);
    let weekday = datetime.weekday().num_days_from_sunday() as u8;
    let subsecond = (datetime.nanosecond() / 1_000_000) * 256 / 1000;
    [
        (datetime.year().rem_euclid(100)) as u8,
        datetime.month() as u8,
        datetime.day() as u8,
        (weekday << 1) | pm,
        (half_day_seconds >> 8) as u8,
        (half_day_seconds & 0xff) as u8,
        subsecond as u8,
    ]
}

/// Storage field holding a packed date at a set of byte offsets.
///
/// Layouts of 3 offsets decode a plain date, 6 offsets a date with time.
#[derive(Debug, Clone)]
pub struct SiDateField {
    offsets: Vec<usize>,
}

impl SiDateField {
    /// A date field reading the given byte offsets in order
    pub fn new(offsets: Vec<usize>) -> Self {
        debug_assert!(matches!(offsets.len(), 3 | 6));
        SiDateField { offsets }
    }
}

impl SiField for SiDateField {
    type Value = NaiveDateTime;

    fn is_value_valid(&self, _value: &Self::Value) -> bool {
        true
    }

    fn value_to_string(&self, value: &Self::Value) -> Result<String, StorageError> {
        Ok(value.format("%Y-%m-%d %H:%M:%S").to_string())
    }

    fn value_from_string(&self, string: &str) -> Result<Self::Value, StorageError> {
        NaiveDateTime::parse_from_str(string, "%Y-%m-%d %H:%M:%S")
            .map_err(|_| StorageError::ValueFromString {
                input: string.to_string(),
            })
    }

    fn extract_value(&self, storage: &SiStorage) -> Option<Self::Value> {
        let mut arr = Vec::with_capacity(self.offsets.len());
        for &offset in &self.offsets {
            arr.push(storage.byte(offset)?);
        }
        arr2date(&arr, None)
    }

    fn update_value(
        &self,
        storage: &mut SiStorage,
        value: &Self::Value,
    ) -> Result<(), StorageError> {
        let arr = date2arr(*value);
        for (&offset, &byte) in self.offsets.iter().zip(arr.iter()) {
            storage.set_byte(offset, byte)?;
        }
        Ok(())
    }
}

/// A decoded station time value.
///
/// `seconds` counts from midnight. The optional weekday and week counter
/// are only present in the 3-byte layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiTimestamp {
    /// Seconds since midnight
    pub seconds: u32,
    /// Day of week, Sunday = 0
    pub weekday: Option<u8>,
    /// Two-bit week counter
    pub week_counter: Option<u8>,
}

/// Storage field holding a half-day time value.
///
/// The value is `Some(None)` for the reserved "no time" marker and `None`
/// when the raw count is out of range or bytes are unknown.
#[derive(Debug, Clone)]
pub struct SiTimeField {
    offsets: Vec<usize>,
}

impl SiTimeField {
    /// A time field over 2 offsets (seconds only) or 3 (with flag byte)
    pub fn new(offsets: Vec<usize>) -> Self {
        debug_assert!(matches!(offsets.len(), 2 | 3));
        SiTimeField { offsets }
    }
}

impl SiField for SiTimeField {
    type Value = Option<SiTimestamp>;

    fn is_value_valid(&self, value: &Self::Value) -> bool {
        match value {
            None => true,
            Some(timestamp) => timestamp.seconds < 86_400,
        }
    }

    fn value_to_string(&self, value: &Self::Value) -> Result<String, StorageError> {
        match value {
            None => Ok("NO_TIME".to_string()),
            Some(timestamp) => {
                let seconds = timestamp.seconds;
                Ok(format!(
                    "{:02}:{:02}:{:02}",
                    seconds / 3600,
                    (seconds % 3600) / 60,
                    seconds % 60
                ))
            }
        }
    }

    fn value_from_string(&self, string: &str) -> Result<Self::Value, StorageError> {
        if string == "NO_TIME" {
            return Ok(None);
        }
        let err = || StorageError::ValueFromString {
            input: string.to_string(),
        };
        let mut parts = string.split(':');
        let hours: u32 = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        let minutes: u32 = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        let seconds: u32 = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        if parts.next().is_some() || hours >= 24 || minutes >= 60 || seconds >= 60 {
            return Err(err());
        }
        Ok(Some(SiTimestamp {
            seconds: hours * 3600 + minutes * 60 + seconds,
            weekday: None,
            week_counter: None,
        }))
    }

    fn extract_value(&self, storage: &SiStorage) -> Option<Self::Value> {
        let high = storage.byte(self.offsets[0])?;
        let low = storage.byte(self.offsets[1])?;
        let raw = u32::from(u16::from_be_bytes([high, low]));
        if raw as u16 == consts::NO_TIME {
            return Some(None);
        }
        let (seconds, weekday, week_counter) = if self.offsets.len() == 3 {
            let flags = storage.byte(self.offsets[2])?;
            let pm = u32::from(flags & 0x01);
            (
                pm * SI_TIME_CUTOFF + raw,
                Some((flags >> 1) & 0x07),
                Some((flags >> 4) & 0x03),
            )
        } else {
            (raw, None, None)
        };
        if seconds >= 86_400 {
            return None;
        }
        Some(Some(SiTimestamp {
            seconds,
            weekday,
            week_counter,
        }))
    }

    fn update_value(
        &self,
        storage: &mut SiStorage,
        value: &Self::Value,
    ) -> Result<(), StorageError> {
        let raw = match value {
            None => u32::from(consts::NO_TIME),
            Some(timestamp) => {
                if self.offsets.len() == 3 {
                    let pm = u8::from(timestamp.seconds >= SI_TIME_CUTOFF);
                    let flags = pm
                        | (timestamp.weekday.unwrap_or(0) & 0x07) << 1
                        | (timestamp.week_counter.unwrap_or(0) & 0x03) << 4;
                    storage.set_byte(self.offsets[2], flags)?;
                    timestamp.seconds % SI_TIME_CUTOFF
                } else {
                    timestamp.seconds
                }
            }
        };
        storage.set_byte(self.offsets[0], (raw >> 8) as u8)?;
        storage.set_byte(self.offsets[1], (raw & 0xff) as u8)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn reference() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 6, 15).unwrap()
    }

    #[test]
    fn test_arr2date_plain() {
        assert_eq!(
            arr2date(&[0x00, 0x01, 0x01], Some(reference())),
            NaiveDate::from_ymd_opt(2000, 1, 1).unwrap().and_hms_opt(0, 0, 0)
        );
    }

    #[test]
    fn test_arr2date_two_digit_year_wraps_backwards() {
        // 99 resolves to 1999 against a 2020 reference.
        assert_eq!(
            arr2date(&[0x63, 0x0c, 0x1f], Some(reference())),
            NaiveDate::from_ymd_opt(1999, 12, 31).unwrap().and_hms_opt(0, 0, 0)
        );
    }

    #[test]
    fn test_arr2date_with_time() {
        // PM flag set, 1:01:01 past noon.
        let arr = [0x14, 0x03, 0x05, 0x01, 0x0e, 0x4d];
        assert_eq!(
            arr2date(&arr, Some(reference())),
            NaiveDate::from_ymd_opt(2020, 3, 5).unwrap().and_hms_opt(13, 1, 1)
        );
    }

    #[test]
    fn test_arr2date_rejects_impossible_dates() {
        assert_eq!(arr2date(&[0x14, 0x00, 0x01], Some(reference())), None);
        assert_eq!(arr2date(&[0x14, 0x0d, 0x01], Some(reference())), None);
        assert_eq!(arr2date(&[0x14, 0x02, 0x1e], Some(reference())), None);
        assert_eq!(arr2date(&[0x64, 0x01, 0x01], Some(reference())), None);
        assert_eq!(arr2date(&[0x14, 0x01], Some(reference())), None);
    }

    #[test]
    fn test_date2arr_roundtrip() {
        let datetime = NaiveDate::from_ymd_opt(2021, 7, 4)
            .unwrap()
            .and_hms_opt(14, 30, 15)
            .unwrap();
        let arr = date2arr(datetime);
        assert_eq!(arr[0], 21);
        assert_eq!(arr[1], 7);
        assert_eq!(arr[2], 4);
        assert_eq!(arr[3] & 0x01, 1);
        assert_eq!(
            arr2date(&arr, Some(NaiveDate::from_ymd_opt(2021, 12, 31).unwrap())),
            Some(datetime)
        );
    }

    #[test]
    fn test_time_field_no_time_marker() {
        let field = SiTimeField::new(vec![0, 1]);
        let mut storage = SiStorage::new(2);
        storage.set_byte(0, 0xee).unwrap();
        storage.set_byte(1, 0xee).unwrap();
        assert_eq!(field.extract_value(&storage), Some(None));
        field.update_value(&mut storage, &None).unwrap();
        assert_eq!(storage.byte(0), Some(0xee));
    }

    #[test]
    fn test_time_field_three_byte_layout() {
        let field = SiTimeField::new(vec![0, 1, 2]);
        let mut storage = SiStorage::new(3);
        // 1 second past noon, Tuesday, week 2.
        let timestamp = SiTimestamp {
            seconds: SI_TIME_CUTOFF + 1,
            weekday: Some(2),
            week_counter: Some(2),
        };
        field.update_value(&mut storage, &Some(timestamp)).unwrap();
        assert_eq!(storage.byte(0), Some(0x00));
        assert_eq!(storage.byte(1), Some(0x01));
        assert_eq!(storage.byte(2), Some(0x25));
        assert_eq!(field.extract_value(&storage), Some(Some(timestamp)));
    }

    #[test]
    fn test_time_field_rejects_out_of_range() {
        let field = SiTimeField::new(vec![0, 1, 2]);
        let mut storage = SiStorage::new(3);
        storage.set_byte(0, 0xff).unwrap();
        storage.set_byte(1, 0xff).unwrap();
        storage.set_byte(2, 0x01).unwrap();
        assert_eq!(field.extract_value(&storage), None);
    }

    #[test]
    fn test_time_field_unknown_bytes() {
        let field = SiTimeField::new(vec![0, 1]);
        let storage = SiStorage::new(2);
        assert_eq!(field.extract_value(&storage), None);
    }
}
