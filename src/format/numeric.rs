// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Boolean, integer and floating point rendering.
//!
//! Output is locale-invariant: no digit grouping, `.` as decimal separator,
//! booleans as `True`/`False`.

use crate::error::FormatError;
use crate::types::{DataType, RawValue};

pub(super) fn format_bool(value: bool) -> String {
    let text = if value { "True" } else { "False" };
    text.to_string()
}

pub(super) fn as_bool(raw: &RawValue) -> Result<bool, FormatError> {
    match raw {
        RawValue::Bool(b) => Ok(*b),
        RawValue::Int(v) => Ok(*v != 0),
        RawValue::UInt(v) => Ok(*v != 0),
        RawValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(FormatError::InvalidNumber(s.clone())),
        },
        RawValue::Float(_) | RawValue::Bytes(_) => Err(FormatError::UnexpectedRaw("BOOL")),
    }
}

pub(super) fn as_i64(raw: &RawValue, type_name: &'static str) -> Result<i64, FormatError> {
    match raw {
        RawValue::Int(v) => Ok(*v),
        RawValue::UInt(v) => i64::try_from(*v).map_err(|_| FormatError::OutOfRange {
            type_name,
            value: v.to_string(),
        }),
        RawValue::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| FormatError::InvalidNumber(s.clone())),
        RawValue::Bool(_) | RawValue::Float(_) | RawValue::Bytes(_) => {
            Err(FormatError::UnexpectedRaw(type_name))
        }
    }
}

pub(super) fn as_u64(raw: &RawValue, type_name: &'static str) -> Result<u64, FormatError> {
    match raw {
        RawValue::UInt(v) => Ok(*v),
        RawValue::Int(v) => u64::try_from(*v).map_err(|_| FormatError::OutOfRange {
            type_name,
            value: v.to_string(),
        }),
        RawValue::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| FormatError::InvalidNumber(s.clone())),
        RawValue::Bool(_) | RawValue::Float(_) | RawValue::Bytes(_) => {
            Err(FormatError::UnexpectedRaw(type_name))
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_f64(raw: &RawValue, type_name: &'static str) -> Result<f64, FormatError> {
    match raw {
        RawValue::Float(v) => Ok(*v),
        RawValue::Int(v) => Ok(*v as f64),
        RawValue::UInt(v) => Ok(*v as f64),
        RawValue::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| FormatError::InvalidNumber(s.clone())),
        RawValue::Bool(_) | RawValue::Bytes(_) => Err(FormatError::UnexpectedRaw(type_name)),
    }
}

pub(super) fn format_signed(raw: &RawValue, data_type: DataType) -> Result<String, FormatError> {
    let type_name = data_type.name();
    let value = as_i64(raw, type_name)?;
    let fits = match data_type {
        DataType::SInt => i8::try_from(value).is_ok(),
        DataType::Int => i16::try_from(value).is_ok(),
        DataType::DInt => i32::try_from(value).is_ok(),
        _ => true,
    };
    if fits {
        Ok(value.to_string())
    } else {
        Err(FormatError::OutOfRange {
            type_name,
            value: value.to_string(),
        })
    }
}

pub(super) fn format_unsigned(raw: &RawValue, data_type: DataType) -> Result<String, FormatError> {
    let type_name = data_type.name();
    let value = as_u64(raw, type_name)?;
    let fits = match data_type {
        DataType::USInt => u8::try_from(value).is_ok(),
        DataType::UInt => u16::try_from(value).is_ok(),
        DataType::UDInt => u32::try_from(value).is_ok(),
        _ => true,
    };
    if fits {
        Ok(value.to_string())
    } else {
        Err(FormatError::OutOfRange {
            type_name,
            value: value.to_string(),
        })
    }
}

/// `REAL` values go through `f32` so that widened values print short.
#[allow(clippy::cast_possible_truncation)]
pub(super) fn format_real(raw: &RawValue) -> Result<String, FormatError> {
    let value = as_f64(raw, "REAL")? as f32;
    Ok(value.to_string())
}

pub(super) fn format_lreal(raw: &RawValue) -> Result<String, FormatError> {
    as_f64(raw, "LREAL").map(|v| v.to_string())
}
