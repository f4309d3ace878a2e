// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! String rendering: passthrough and fixed-size UTF-16 buffers.

use crate::error::FormatError;
use crate::types::RawValue;

use super::numeric::format_bool;

/// Renders any raw value as-is.
///
/// Byte buffers are decoded as UTF-8 (lossy) up to the first NUL and at
/// most `size` bytes when `size` is non-zero.
pub(super) fn passthrough(raw: &RawValue, size: usize) -> String {
    match raw {
        RawValue::Text(s) => s.clone(),
        RawValue::Bool(b) => format_bool(*b),
        RawValue::Int(v) => v.to_string(),
        RawValue::UInt(v) => v.to_string(),
        RawValue::Float(v) => v.to_string(),
        RawValue::Bytes(bytes) => {
            let limit = if size == 0 { bytes.len() } else { size.min(bytes.len()) };
            let bytes = &bytes[..limit];
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            String::from_utf8_lossy(&bytes[..end]).into_owned()
        }
    }
}

/// Decodes a little-endian UTF-16 buffer of `size` code units.
///
/// Decoding stops at the first NUL code unit. A zero `size` decodes the
/// whole buffer; a trailing odd byte is ignored.
pub(super) fn decode_wstring(raw: &RawValue, size: usize) -> Result<String, FormatError> {
    match raw {
        RawValue::Text(s) => Ok(s.clone()),
        RawValue::Bytes(bytes) => {
            let units = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .take(if size == 0 { usize::MAX } else { size })
                .take_while(|&unit| unit != 0);
            Ok(char::decode_utf16(units)
                .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect())
        }
        _ => Err(FormatError::UnexpectedRaw("WSTRING")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16(text: &str) -> Vec<u8> {
        text.encode_utf16().flat_map(u16::to_le_bytes).collect()
    }

    #[test]
    fn wstring_stops_at_nul() {
        let mut buf = utf16("Motor");
        buf.extend_from_slice(&[0, 0, b'x', 0]);
        assert_eq!(decode_wstring(&RawValue::Bytes(buf), 0).unwrap(), "Motor");
    }

    #[test]
    fn wstring_respects_size() {
        let buf = utf16("Temperature");
        assert_eq!(decode_wstring(&RawValue::Bytes(buf), 4).unwrap(), "Temp");
    }

    #[test]
    fn wstring_non_ascii() {
        let buf = utf16("Grüße €");
        assert_eq!(decode_wstring(&RawValue::Bytes(buf), 0).unwrap(), "Grüße €");
    }

    #[test]
    fn wstring_lone_surrogate_is_replaced() {
        let buf = vec![0x00, 0xD8, b'A', 0x00];
        assert_eq!(decode_wstring(&RawValue::Bytes(buf), 0).unwrap(), "\u{FFFD}A");
    }

    #[test]
    fn wstring_rejects_numbers() {
        assert!(decode_wstring(&RawValue::UInt(3), 0).is_err());
    }

    #[test]
    fn passthrough_bytes() {
        let raw = RawValue::Bytes(b"abc\0def".to_vec());
        assert_eq!(passthrough(&raw, 0), "abc");
        assert_eq!(passthrough(&RawValue::Bytes(b"abcdef".to_vec()), 2), "ab");
    }

    #[test]
    fn passthrough_scalars() {
        assert_eq!(passthrough(&RawValue::Bool(false), 0), "False");
        assert_eq!(passthrough(&RawValue::Float(1.25), 0), "1.25");
        assert_eq!(passthrough(&RawValue::Text("21.5".into()), 0), "21.5");
    }
}
