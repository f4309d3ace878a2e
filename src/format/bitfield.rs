// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bit-field (`BYTE`/`WORD`/`DWORD`/`LWORD`) rendering.

use crate::error::FormatError;

/// Renders a bit-field as decimal, grouped hex and grouped binary.
///
/// Hex digits are padded to `width / 4` and grouped by two, binary digits
/// are padded to `width` and grouped by four.
///
/// # Errors
///
/// Returns [`FormatError::OutOfRange`] if `value` needs more than `width` bits.
///
/// # Examples
///
/// ```
/// use tagwatch::format::format_bit_field;
///
/// assert_eq!(
///     format_bit_field(0xA5, 8).unwrap(),
///     "(165) Hex: a5 | Dec: 1010_0101"
/// );
/// ```
pub fn format_bit_field(value: u64, width: u32) -> Result<String, FormatError> {
    if width < 64 && value >> width != 0 {
        return Err(FormatError::OutOfRange {
            type_name: type_name(width),
            value: value.to_string(),
        });
    }

    let hex_digits = (width / 4) as usize;
    let bin_digits = width as usize;
    let hex = group(&format!("{value:0hex_digits$x}"), 2);
    let bin = group(&format!("{value:0bin_digits$b}"), 4);

    Ok(format!("({value}) Hex: {hex} | Dec: {bin}"))
}

fn type_name(width: u32) -> &'static str {
    match width {
        0..=8 => "BYTE",
        9..=16 => "WORD",
        17..=32 => "DWORD",
        _ => "LWORD",
    }
}

/// Inserts `_` every `n` characters, counting from the left.
fn group(digits: &str, n: usize) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / n);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && i % n == 0 {
            out.push('_');
        }
        out.push(c);
    }
    out
}
