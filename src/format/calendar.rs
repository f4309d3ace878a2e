// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `DATE`, `DATE_AND_TIME` and `TIME_OF_DAY` rendering.
//!
//! PLC calendar values are offsets from 1970-01-01 00:00:00 UTC and are
//! rendered in UTC with their IEC literal prefix.

use chrono::{DateTime, Utc};

use crate::error::FormatError;

fn from_epoch_seconds(seconds: i64) -> Result<DateTime<Utc>, FormatError> {
    DateTime::from_timestamp(seconds, 0).ok_or(FormatError::InvalidTimestamp(seconds))
}

/// Renders seconds since the epoch as `D#yyyy-MM-dd`.
///
/// # Errors
///
/// Returns [`FormatError::InvalidTimestamp`] outside chrono's range.
pub fn format_date(seconds: i64) -> Result<String, FormatError> {
    Ok(from_epoch_seconds(seconds)?.format("D#%Y-%m-%d").to_string())
}

/// Renders seconds since the epoch as `DT#yyyy-MM-dd HH:mm:ss`.
///
/// # Errors
///
/// Returns [`FormatError::InvalidTimestamp`] outside chrono's range.
pub fn format_date_and_time(seconds: i64) -> Result<String, FormatError> {
    Ok(from_epoch_seconds(seconds)?
        .format("DT#%Y-%m-%d %H:%M:%S")
        .to_string())
}

/// Renders milliseconds since midnight as `TOD#HH:mm:ss`.
///
/// Sub-second precision is dropped.
///
/// # Errors
///
/// Returns [`FormatError::InvalidTimestamp`] if the value overflows.
pub fn format_time_of_day(ms: u64) -> Result<String, FormatError> {
    let seconds = i64::try_from(ms / 1_000).map_err(|_| FormatError::InvalidTimestamp(i64::MAX))?;
    Ok(from_epoch_seconds(seconds)?.format("TOD#%H:%M:%S").to_string())
}
