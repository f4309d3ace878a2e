// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Change callbacks.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// Callback invoked with `(key, formatted_value)` on every accepted change.
///
/// Callbacks run on the driver's dispatch path and must not block.
///
/// Callbacks for one key are serialized by a non-reentrant lock. A callback
/// must not re-enter the registry for its own key, either by dispatching an
/// event for it or by publishing to it from a blocking context; doing so
/// deadlocks. Hand such work off to a task instead.
pub type ValueCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Wraps a closure into a [`ValueCallback`].
///
/// # Examples
///
/// ```
/// use tagwatch::subscription::callback;
///
/// let cb = callback(|key, value| println!("{key} = {value}"));
/// cb("sensor/temp", "21.5");
/// ```
pub fn callback<F>(f: F) -> ValueCallback
where
    F: Fn(&str, &str) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Runs a callback, containing any panic it raises.
///
/// Returns `false` if the callback panicked. The panic is logged and the
/// caller carries on.
pub(crate) fn invoke_isolated(cb: &ValueCallback, key: &str, value: &str, client_id: &str) -> bool {
    match catch_unwind(AssertUnwindSafe(|| cb(key, value))) {
        Ok(()) => true,
        Err(payload) => {
            tracing::error!(
                client_id = %client_id,
                key = %key,
                error = %panic_message(payload.as_ref()),
                "Change callback failed"
            );
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
