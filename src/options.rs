// Copyright (c) 2023 -  Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Partition-actor configuration. Cluster-wide configuration loading lives
//! elsewhere; this is just the local knob the actor needs to build its
//! mailbox.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::Parser, Serialize, Deserialize)]
#[cfg_attr(feature = "options_schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "kebab-case")]
#[group(skip)]
pub struct Options {
    /// Bounded capacity of the actor's mailbox channel.
    #[arg(long = "partition-actor-mailbox-capacity", default_value_t = default_mailbox_capacity())]
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
}

const fn default_mailbox_capacity() -> usize {
    256
}

impl Default for Options {
    fn default() -> Self {
        Self {
            mailbox_capacity: default_mailbox_capacity(),
        }
    }
}
