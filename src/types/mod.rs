// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types shared by drivers, formatting and the registry.
//!
//! # Types
//!
//! - [`RawValue`] - a value as pushed by a driver, before formatting
//! - [`DataType`] - declared IEC 61131-3 type of a data point
//! - [`FormatHint`] - type plus declared string length

mod data_type;
mod raw_value;

pub use data_type::{DataType, FormatHint};
pub use raw_value::RawValue;
