// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Raw reachability flags and connectivity classification.
//!
//! This module is the pure layer of the crate: a bitset of low-level route
//! characteristics ([`FlagSet`]), the coarse-grained connectivity state
//! derived from it ([`Status`]), and the [`classify`] function mapping one to
//! the other. Nothing here performs I/O or holds state.

use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// Raw route/connection characteristics for a monitored target.
    ///
    /// Obtained from the platform layer and compared by equality to detect
    /// changes. The empty set means the target is not reachable.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FlagSet: u32 {
        /// The target is reachable via a transient connection (e.g. PPP).
        const TRANSIENT_CONNECTION = 1 << 0;
        /// The target is reachable with the current network configuration.
        const REACHABLE = 1 << 1;
        /// A connection must be established first.
        const CONNECTION_REQUIRED = 1 << 2;
        /// A connection will be established on traffic.
        const CONNECTION_ON_TRAFFIC = 1 << 3;
        /// User intervention is required to establish the connection.
        const INTERVENTION_REQUIRED = 1 << 4;
        /// A connection will be established on demand.
        const CONNECTION_ON_DEMAND = 1 << 5;
        /// The target is an address on a local interface.
        const IS_LOCAL_ADDRESS = 1 << 16;
        /// Traffic does not pass through a gateway.
        const IS_DIRECT = 1 << 17;
        /// The route goes over the cellular (WWAN) interface.
        const IS_CELLULAR = 1 << 18;
    }
}

impl Default for FlagSet {
    /// The empty set: no route characteristics, classified unreachable.
    fn default() -> Self {
        Self::empty()
    }
}

impl FlagSet {
    /// The target is reachable with the current configuration.
    #[must_use]
    pub fn is_reachable(self) -> bool {
        self.contains(Self::REACHABLE)
    }

    /// A connection must be established before traffic can flow.
    #[must_use]
    pub fn connection_required(self) -> bool {
        self.contains(Self::CONNECTION_REQUIRED)
    }

    /// The connection is transient (dial-up style).
    #[must_use]
    pub fn is_transient(self) -> bool {
        self.contains(Self::TRANSIENT_CONNECTION)
    }

    /// The target resolves to a local interface address.
    #[must_use]
    pub fn is_local(self) -> bool {
        self.contains(Self::IS_LOCAL_ADDRESS)
    }

    /// Traffic reaches the target without passing through a gateway.
    #[must_use]
    pub fn is_direct(self) -> bool {
        self.contains(Self::IS_DIRECT)
    }

    /// The route goes over the cellular interface.
    #[must_use]
    pub fn is_cellular(self) -> bool {
        self.contains(Self::IS_CELLULAR)
    }

    /// A connection will be established when traffic is sent.
    #[must_use]
    pub fn connection_on_traffic(self) -> bool {
        self.contains(Self::CONNECTION_ON_TRAFFIC)
    }

    /// A connection will be established on demand.
    #[must_use]
    pub fn connection_on_demand(self) -> bool {
        self.contains(Self::CONNECTION_ON_DEMAND)
    }

    /// Establishing the connection needs user intervention.
    #[must_use]
    pub fn intervention_required(self) -> bool {
        self.contains(Self::INTERVENTION_REQUIRED)
    }

    /// The connection is established automatically, on traffic or on demand.
    #[must_use]
    pub fn connection_automatic(self) -> bool {
        self.connection_on_traffic() || self.connection_on_demand()
    }
}

impl fmt::Display for FlagSet {
    /// Compact one-character-per-flag form for log lines, e.g. `WR -t----d`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn mark(set: bool, c: char) -> char {
            if set {
                c
            } else {
                '-'
            }
        }
        write!(
            f,
            "{}{} {}{}{}{}{}{}{}",
            mark(self.is_cellular(), 'W'),
            mark(self.is_reachable(), 'R'),
            mark(self.connection_required(), 'c'),
            mark(self.is_transient(), 't'),
            mark(self.connection_on_traffic(), 'C'),
            mark(self.connection_on_demand(), 'D'),
            mark(self.intervention_required(), 'i'),
            mark(self.is_local(), 'l'),
            mark(self.is_direct(), 'd'),
        )
    }
}

/// Coarse-grained connectivity classification for a monitored target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// The target cannot currently be reached.
    Unreachable,
    /// The target is reachable over a non-cellular interface.
    Wifi,
    /// The target is reachable over the cellular interface.
    Cellular,
}

impl Status {
    /// Whether this status represents a reachable target.
    #[must_use]
    pub fn is_reachable(self) -> bool {
        !matches!(self, Self::Unreachable)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unreachable => "unreachable",
            Self::Wifi => "wifi",
            Self::Cellular => "cellular",
        };
        f.write_str(name)
    }
}

/// Classify raw flags into a [`Status`].
///
/// Pure and deterministic. `is_physical_device` is an injected environment
/// fact: emulated environments never classify as [`Status::Cellular`], even
/// with the cellular bit set. `treat_cellular_as_reachable` is the policy
/// knob for counting cellular routes as connected at all.
///
/// The transient-connection rejection is intentionally an exact-set test:
/// only the flag set that is precisely `CONNECTION_REQUIRED |
/// TRANSIENT_CONNECTION` is rejected. Any additional bit (notably
/// `REACHABLE`) disarms the rule.
#[must_use]
pub fn classify(flags: FlagSet, is_physical_device: bool, treat_cellular_as_reachable: bool) -> Status {
    let transient_only = flags == FlagSet::CONNECTION_REQUIRED | FlagSet::TRANSIENT_CONNECTION;

    let mut connected = flags.is_reachable() && !transient_only;
    if is_physical_device && flags.is_cellular() && !treat_cellular_as_reachable {
        connected = false;
    }

    if !connected {
        Status::Unreachable
    } else if is_physical_device && flags.is_cellular() {
        Status::Cellular
    } else {
        Status::Wifi
    }
}
