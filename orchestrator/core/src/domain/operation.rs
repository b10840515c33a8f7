// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::graph::WalkDirection;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Project-wide lifecycle verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Up,
    Start,
    Stop,
    Pause,
    Unpause,
    Kill,
    RemoveStopped,
    Scale,
    Down,
}

impl Operation {
    pub fn direction(&self) -> WalkDirection {
        match self {
            Self::Create | Self::Up | Self::Start | Self::Unpause | Self::Scale => {
                WalkDirection::DependenciesFirst
            }
            Self::Stop | Self::Pause | Self::Kill | Self::RemoveStopped | Self::Down => {
                WalkDirection::DependentsFirst
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Up => "up",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Pause => "pause",
            Self::Unpause => "unpause",
            Self::Kill => "kill",
            Self::RemoveStopped => "remove_stopped",
            Self::Scale => "scale",
            Self::Down => "down",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
