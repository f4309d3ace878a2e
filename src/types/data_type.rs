// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Declared data types and formatting hints.
//!
//! PLC variables come with an IEC 61131-3 type name (`UINT`, `TIME`,
//! `WSTRING(80)`, ...). The name decides how a raw value is rendered for
//! display. MQTT topics carry no type and use [`FormatHint::passthrough`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Declared type of a remote data point.
///
/// Parsing is case-insensitive and never fails: unknown names map to
/// [`DataType::Text`], which renders values as-is.
///
/// # Examples
///
/// ```
/// use tagwatch::types::DataType;
///
/// assert_eq!(DataType::from_tag("uint"), DataType::UInt);
/// assert_eq!(DataType::from_tag("WSTRING(80)"), DataType::WString);
/// assert_eq!(DataType::from_tag("MyStruct"), DataType::Text);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DataType {
    /// `BOOL` / `BOOLEAN`.
    Bool,
    /// `SINT`, 8-bit signed.
    SInt,
    /// `USINT`, 8-bit unsigned.
    USInt,
    /// `INT`, 16-bit signed.
    Int,
    /// `UINT`, 16-bit unsigned.
    UInt,
    /// `DINT`, 32-bit signed.
    DInt,
    /// `UDINT`, 32-bit unsigned.
    UDInt,
    /// `LINT`, 64-bit signed.
    LInt,
    /// `ULINT`, 64-bit unsigned.
    ULInt,
    /// `REAL`, 32-bit float.
    Real,
    /// `LREAL`, 64-bit float.
    LReal,
    /// `TIME`, milliseconds in 32 bits.
    Time,
    /// `LTIME`, nanoseconds in 64 bits.
    LTime,
    /// `BYTE`, 8-bit field.
    Byte,
    /// `WORD`, 16-bit field.
    Word,
    /// `DWORD`, 32-bit field.
    DWord,
    /// `LWORD`, 64-bit field.
    LWord,
    /// `DATE`, seconds since the Unix epoch (day shown only).
    Date,
    /// `DATE_AND_TIME` / `DT`, seconds since the Unix epoch.
    DateAndTime,
    /// `TIME_OF_DAY` / `TOD`, milliseconds.
    TimeOfDay,
    /// `STRING` / `STRING(n)`, single-byte text.
    String,
    /// `WSTRING` / `WSTRING(n)`, UTF-16 text.
    WString,
    /// Untyped payload, rendered as-is.
    #[default]
    Text,
}

impl DataType {
    /// Parses a type tag such as `"UINT"` or `"wstring(20)"`.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        let upper = tag.trim().to_ascii_uppercase();
        match upper.as_str() {
            "BOOL" | "BOOLEAN" => Self::Bool,
            "SINT" => Self::SInt,
            "USINT" => Self::USInt,
            "INT" => Self::Int,
            "UINT" => Self::UInt,
            "DINT" => Self::DInt,
            "UDINT" => Self::UDInt,
            "LINT" => Self::LInt,
            "ULINT" => Self::ULInt,
            "REAL" => Self::Real,
            "LREAL" => Self::LReal,
            "TIME" => Self::Time,
            "LTIME" => Self::LTime,
            "BYTE" => Self::Byte,
            "WORD" => Self::Word,
            "DWORD" => Self::DWord,
            "LWORD" => Self::LWord,
            "DATE" => Self::Date,
            "DATE_AND_TIME" | "DT" => Self::DateAndTime,
            "TIME_OF_DAY" | "TOD" => Self::TimeOfDay,
            s if s.starts_with("WSTRING") => Self::WString,
            s if s.starts_with("STRING") => Self::String,
            _ => Self::Text,
        }
    }

    /// Returns the canonical tag name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "BOOL",
            Self::SInt => "SINT",
            Self::USInt => "USINT",
            Self::Int => "INT",
            Self::UInt => "UINT",
            Self::DInt => "DINT",
            Self::UDInt => "UDINT",
            Self::LInt => "LINT",
            Self::ULInt => "ULINT",
            Self::Real => "REAL",
            Self::LReal => "LREAL",
            Self::Time => "TIME",
            Self::LTime => "LTIME",
            Self::Byte => "BYTE",
            Self::Word => "WORD",
            Self::DWord => "DWORD",
            Self::LWord => "LWORD",
            Self::Date => "DATE",
            Self::DateAndTime => "DATE_AND_TIME",
            Self::TimeOfDay => "TIME_OF_DAY",
            Self::String => "STRING",
            Self::WString => "WSTRING",
            Self::Text => "TEXT",
        }
    }

    /// Returns the width in bits for the bit-field family.
    #[must_use]
    pub fn bit_width(self) -> Option<u32> {
        match self {
            Self::Byte => Some(8),
            Self::Word => Some(16),
            Self::DWord => Some(32),
            Self::LWord => Some(64),
            _ => None,
        }
    }
}

impl From<String> for DataType {
    fn from(tag: String) -> Self {
        Self::from_tag(&tag)
    }
}

impl From<DataType> for String {
    fn from(data_type: DataType) -> Self {
        data_type.name().to_string()
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Type descriptor used to render raw values of one subscription.
///
/// `size` is the declared length for string types, in characters. It is
/// ignored by the other families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FormatHint {
    /// Declared data type.
    pub data_type: DataType,
    /// Declared length for `STRING`/`WSTRING`, zero when unknown.
    pub size: usize,
}

impl FormatHint {
    /// Creates a hint from a data type and size.
    #[must_use]
    pub fn new(data_type: DataType, size: usize) -> Self {
        Self { data_type, size }
    }

    /// Hint for untyped payloads (MQTT), rendered as-is.
    #[must_use]
    pub fn passthrough() -> Self {
        Self::default()
    }

    /// Parses a type tag, taking the size from a `(n)` or `[n]` suffix
    /// when `size` is zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use tagwatch::types::{DataType, FormatHint};
    ///
    /// let hint = FormatHint::from_tag("WSTRING(20)", 0);
    /// assert_eq!(hint.data_type, DataType::WString);
    /// assert_eq!(hint.size, 20);
    ///
    /// // An explicit size wins over the suffix
    /// assert_eq!(FormatHint::from_tag("STRING(80)", 10).size, 10);
    /// ```
    #[must_use]
    pub fn from_tag(tag: &str, size: usize) -> Self {
        let data_type = DataType::from_tag(tag);
        let size = if size == 0 {
            parse_size_suffix(tag).unwrap_or(0)
        } else {
            size
        };
        Self { data_type, size }
    }
}

impl fmt::Display for FormatHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.size > 0 {
            write!(f, "{}[{}]", self.data_type, self.size)
        } else {
            write!(f, "{}", self.data_type)
        }
    }
}

/// Extracts `n` from `NAME(n)` or `NAME[n]`.
fn parse_size_suffix(tag: &str) -> Option<usize> {
    let open = tag.find(['(', '['])?;
    let rest = &tag[open + 1..];
    let close = rest.find([')', ']'])?;
    rest[..close].trim().parse().ok()
}
