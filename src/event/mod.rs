// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Connection events.
//!
//! A [`Client`](crate::Client) reports connection changes as
//! [`ClientEvent`]s over an [`EventBus`], so that several observers (a UI,
//! a supervisor task, a log) can follow the same connection.
//!
//! # Examples
//!
//! ```
//! use tagwatch::event::{ClientEvent, EventBus};
//!
//! let bus = EventBus::new();
//! let mut rx = bus.subscribe();
//!
//! bus.publish(ClientEvent::Connected);
//! assert_eq!(rx.try_recv().unwrap(), ClientEvent::Connected);
//! ```

mod client_event;
mod event_bus;

pub use client_event::ClientEvent;
pub use event_bus::EventBus;
