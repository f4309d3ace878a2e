// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Rendering of raw driver values into display strings.
//!
//! The rendering is table-driven by the subscription's [`FormatHint`]:
//!
//! | Family | Types | Example |
//! |---|---|---|
//! | boolean, integers, floats | `BOOL`, `SINT`..`ULINT`, `REAL`, `LREAL` | `True`, `-12`, `21.5` |
//! | duration | `TIME`, `LTIME` | `T#1M 1S 234MS` |
//! | bit-field | `BYTE`, `WORD`, `DWORD`, `LWORD` | `(5) Hex: 05 \| Dec: 0000_0101` |
//! | calendar | `DATE`, `DT`, `TOD` | `D#2024-04-26`, `DT#2024-04-26 10:30:00`, `TOD#10:30:00` |
//! | wide string | `WSTRING` | UTF-16 buffer decoded to text |
//! | passthrough | `STRING`, anything else | value as-is |
//!
//! A value that does not fit its declared family falls back to the
//! passthrough rendering, so [`format_value`] never fails.
//!
//! # Examples
//!
//! ```
//! use tagwatch::format::format_value;
//! use tagwatch::types::{DataType, FormatHint, RawValue};
//!
//! let hint = FormatHint::new(DataType::Time, 0);
//! assert_eq!(format_value(&RawValue::UInt(61_234), &hint), "T#1M 1S 234MS");
//!
//! let hint = FormatHint::new(DataType::Word, 0);
//! assert_eq!(
//!     format_value(&RawValue::UInt(0), &hint),
//!     "(0) Hex: 00_00 | Dec: 0000_0000_0000_0000"
//! );
//! ```

mod bitfield;
mod calendar;
mod duration;
mod numeric;
mod text;

pub use bitfield::format_bit_field;
pub use calendar::{format_date, format_date_and_time, format_time_of_day};
pub use duration::format_duration_ms;

use crate::error::FormatError;
use crate::types::{DataType, FormatHint, RawValue};

/// Renders a raw value according to the hint, falling back to passthrough.
#[must_use]
pub fn format_value(raw: &RawValue, hint: &FormatHint) -> String {
    match try_format_value(raw, hint) {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!(
                data_type = %hint.data_type,
                raw_kind = raw.kind(),
                error = %e,
                "Value does not fit declared type, rendering as-is"
            );
            text::passthrough(raw, 0)
        }
    }
}

/// Renders a raw value according to the hint.
///
/// # Errors
///
/// Returns [`FormatError`] if the value does not fit the declared type.
pub fn try_format_value(raw: &RawValue, hint: &FormatHint) -> Result<String, FormatError> {
    let data_type = hint.data_type;
    match data_type {
        DataType::Bool => numeric::as_bool(raw).map(numeric::format_bool),
        DataType::SInt
        | DataType::Int
        | DataType::DInt
        | DataType::LInt => numeric::format_signed(raw, data_type),
        DataType::USInt
        | DataType::UInt
        | DataType::UDInt
        | DataType::ULInt => numeric::format_unsigned(raw, data_type),
        DataType::Real => numeric::format_real(raw),
        DataType::LReal => numeric::format_lreal(raw),
        DataType::Time => {
            let ms = numeric::as_u64(raw, "TIME")?;
            Ok(format_duration_ms(ms))
        }
        DataType::LTime => {
            let ns = numeric::as_u64(raw, "LTIME")?;
            Ok(format_duration_ms(ns / 1_000_000))
        }
        DataType::Byte | DataType::Word | DataType::DWord | DataType::LWord => {
            let value = numeric::as_u64(raw, data_type.name())?;
            // bit_width is Some for the whole bit-field family
            let width = data_type.bit_width().unwrap_or(64);
            format_bit_field(value, width)
        }
        DataType::Date => format_date(numeric::as_i64(raw, "DATE")?),
        DataType::DateAndTime => format_date_and_time(numeric::as_i64(raw, "DATE_AND_TIME")?),
        DataType::TimeOfDay => format_time_of_day(numeric::as_u64(raw, "TIME_OF_DAY")?),
        DataType::WString => text::decode_wstring(raw, hint.size),
        DataType::String | DataType::Text => Ok(text::passthrough(raw, hint.size)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(tag: &str, raw: impl Into<RawValue>) -> String {
        format_value(&raw.into(), &FormatHint::from_tag(tag, 0))
    }

    #[test]
    fn word_zero_grouping() {
        assert_eq!(fmt("WORD", 0_u16), "(0) Hex: 00_00 | Dec: 0000_0000_0000_0000");
    }

    #[test]
    fn time_minutes() {
        assert_eq!(fmt("TIME", 61_234_u32), "T#1M 1S 234MS");
    }

    #[test]
    fn type_tag_is_case_insensitive() {
        assert_eq!(fmt("time", 61_234_u32), "T#1M 1S 234MS");
        assert_eq!(fmt("Word", 0_u16), fmt("WORD", 0_u16));
    }

    #[test]
    fn ltime_is_nanoseconds() {
        assert_eq!(fmt("LTIME", 61_234_000_000_u64), "T#1M 1S 234MS");
    }

    #[test]
    fn numeric_families() {
        assert_eq!(fmt("BOOL", true), "True");
        assert_eq!(fmt("INT", -12_i16), "-12");
        assert_eq!(fmt("UDINT", 4_000_000_000_u32), "4000000000");
        assert_eq!(fmt("REAL", 21.5_f32), "21.5");
        assert_eq!(fmt("LREAL", 0.1_f64), "0.1");
    }

    #[test]
    fn text_payload_for_numeric_type_is_parsed() {
        assert_eq!(fmt("TIME", "1500"), "T#1S 500MS");
        assert_eq!(fmt("BYTE", "5"), "(5) Hex: 05 | Dec: 0000_0101");
    }

    #[test]
    fn mismatch_falls_back_to_passthrough() {
        assert_eq!(fmt("UINT", "hello"), "hello");
        assert_eq!(fmt("USINT", 300_u16), "300");
        assert_eq!(fmt("BYTE", 256_u16), "256");
        assert_eq!(fmt("BOOL", "maybe"), "maybe");
    }

    #[test]
    fn try_format_reports_error() {
        let hint = FormatHint::new(DataType::SInt, 0);
        let err = try_format_value(&RawValue::Int(200), &hint).unwrap_err();
        assert!(matches!(err, FormatError::OutOfRange { type_name: "SINT", .. }));
    }

    #[test]
    fn calendar_families() {
        assert_eq!(fmt("DATE", 0_u32), "D#1970-01-01");
        assert_eq!(fmt("DT", 86_461_u32), "DT#1970-01-02 00:01:01");
        assert_eq!(fmt("TOD", 3_723_000_u32), "TOD#01:02:03");
    }

    #[test]
    fn wstring_from_bytes() {
        let raw: Vec<u8> = "Hi".encode_utf16().flat_map(u16::to_le_bytes).collect();
        assert_eq!(fmt("WSTRING(10)", raw), "Hi");
    }

    #[test]
    fn unknown_type_passthrough() {
        assert_eq!(fmt("ST_Motor", "running"), "running");
        assert_eq!(fmt("", 42_u8), "42");
    }
}
