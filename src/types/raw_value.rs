// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Raw values as delivered by transport drivers.

use serde::{Deserialize, Serialize};

/// A value pushed by a driver, before formatting.
///
/// Typed transports (PLC tags) deliver native numbers or byte buffers;
/// pub/sub transports (MQTT) deliver payload text.
///
/// # Examples
///
/// ```
/// use tagwatch::types::RawValue;
///
/// assert_eq!(RawValue::from(42_u16), RawValue::UInt(42));
/// assert_eq!(RawValue::from("21.5"), RawValue::Text("21.5".to_string()));
/// assert_eq!(RawValue::from_payload(b"ON"), RawValue::Text("ON".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum RawValue {
    /// Boolean value.
    Bool(bool),
    /// Signed integer, any width.
    Int(i64),
    /// Unsigned integer, any width.
    UInt(u64),
    /// Floating point value.
    Float(f64),
    /// Raw byte buffer (wide strings, unknown structures).
    Bytes(Vec<u8>),
    /// Text payload.
    Text(String),
}

impl RawValue {
    /// Builds a raw value from a message payload.
    ///
    /// Valid UTF-8 becomes [`RawValue::Text`], anything else stays bytes.
    #[must_use]
    pub fn from_payload(payload: &[u8]) -> Self {
        match std::str::from_utf8(payload) {
            Ok(text) => Self::Text(text.to_string()),
            Err(_) => Self::Bytes(payload.to_vec()),
        }
    }

    /// Returns the variant name, for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Float(_) => "float",
            Self::Bytes(_) => "bytes",
            Self::Text(_) => "text",
        }
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

macro_rules! impl_from_signed {
    ($($t:ty),*) => {
        $(impl From<$t> for RawValue {
            fn from(value: $t) -> Self {
                Self::Int(i64::from(value))
            }
        })*
    };
}

macro_rules! impl_from_unsigned {
    ($($t:ty),*) => {
        $(impl From<$t> for RawValue {
            fn from(value: $t) -> Self {
                Self::UInt(u64::from(value))
            }
        })*
    };
}

impl_from_signed!(i8, i16, i32, i64);
impl_from_unsigned!(u8, u16, u32, u64);

impl From<f32> for RawValue {
    fn from(value: f32) -> Self {
        Self::Float(f64::from(value))
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for RawValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}
