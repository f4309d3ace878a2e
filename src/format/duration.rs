// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! IEC 61131-3 `TIME` literal rendering.

const MS_PER_SECOND: u64 = 1_000;
const MS_PER_MINUTE: u64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: u64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: u64 = 24 * MS_PER_HOUR;

/// Renders a millisecond count as a `T#` duration literal.
///
/// Units are listed from the largest populated one down to milliseconds;
/// smaller units are always shown once a larger one is present.
///
/// # Examples
///
/// ```
/// use tagwatch::format::format_duration_ms;
///
/// assert_eq!(format_duration_ms(234), "T#234MS");
/// assert_eq!(format_duration_ms(61_234), "T#1M 1S 234MS");
/// assert_eq!(format_duration_ms(86_400_000), "T#1D 0H 0M 0S 0MS");
/// ```
#[must_use]
pub fn format_duration_ms(ms: u64) -> String {
    let days = ms / MS_PER_DAY;
    let hours = (ms % MS_PER_DAY) / MS_PER_HOUR;
    let minutes = (ms % MS_PER_HOUR) / MS_PER_MINUTE;
    let seconds = (ms % MS_PER_MINUTE) / MS_PER_SECOND;
    let millis = ms % MS_PER_SECOND;

    if ms < MS_PER_SECOND {
        format!("T#{millis}MS")
    } else if ms < MS_PER_MINUTE {
        format!("T#{seconds}S {millis}MS")
    } else if ms < MS_PER_HOUR {
        format!("T#{minutes}M {seconds}S {millis}MS")
    } else if ms < MS_PER_DAY {
        format!("T#{hours}H {minutes}M {seconds}S {millis}MS")
    } else {
        format!("T#{days}D {hours}H {minutes}M {seconds}S {millis}MS")
    }
}
