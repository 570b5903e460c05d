// Copyright (c) 2023 -  Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;

/// The full set of Raft-visible roles a member can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Leader,
    Follower,
    Candidate,
    Promotable,
    Passive,
    Inactive,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Leader => "leader",
            Role::Follower => "follower",
            Role::Candidate => "candidate",
            Role::Promotable => "promotable",
            Role::Passive => "passive",
            Role::Inactive => "inactive",
        };
        f.write_str(s)
    }
}

/// The three destinations the transition engine actually installs recipes
/// for. Every non-leader, non-inactive `Role` collapses into `Follower` so
/// Raft's internal churn between active-but-not-leader states never causes
/// service churn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerRole {
    Leader,
    Follower,
    Inactive,
}

impl fmt::Display for ControllerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ControllerRole::Leader => "leader",
            ControllerRole::Follower => "follower",
            ControllerRole::Inactive => "inactive",
        };
        f.write_str(s)
    }
}

impl Role {
    /// `newRole == Leader` (and we weren't already leader) always
    /// transitions; `Inactive` always transitions; anything else only
    /// transitions if we were previously `Leader` or we don't yet know our
    /// role (`previous == None`). Returns `None` when the event must be
    /// treated as a no-op.
    pub fn to_controller_role(self, previous: Option<ControllerRole>) -> Option<ControllerRole> {
        match self {
            Role::Inactive => Some(ControllerRole::Inactive),
            Role::Leader => {
                if previous == Some(ControllerRole::Leader) {
                    None
                } else {
                    Some(ControllerRole::Leader)
                }
            }
            Role::Follower | Role::Candidate | Role::Promotable | Role::Passive => {
                match previous {
                    Some(ControllerRole::Leader) | None => Some(ControllerRole::Follower),
                    _ => None,
                }
            }
        }
    }
}
