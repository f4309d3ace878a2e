// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Registry configuration.

use serde::{Deserialize, Serialize};

/// What [`publish`] does when the value equals the stored one.
///
/// [`publish`]: super::SubscriptionRegistry::publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishPolicy {
    /// Do nothing and return `Ok(false)`.
    #[default]
    SkipUnchanged,
    /// Send anyway. The local callback still only fires on a change.
    Always,
}

/// Options for a [`SubscriptionRegistry`](super::SubscriptionRegistry).
///
/// # Examples
///
/// ```
/// use tagwatch::subscription::{PublishPolicy, RegistryConfig};
///
/// let config = RegistryConfig::default().with_publish_policy(PublishPolicy::Always);
/// assert_eq!(config.publish_dedup, PublishPolicy::Always);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Publish deduplication policy.
    pub publish_dedup: PublishPolicy,
}

impl RegistryConfig {
    /// Sets the publish deduplication policy.
    #[must_use]
    pub fn with_publish_policy(mut self, policy: PublishPolicy) -> Self {
        self.publish_dedup = policy;
        self
    }
}
