// SimBridge - HW/SW Co-Simulation Bridge
// Copyright (C) 2026 SimBridge Contributors
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Unix-socket servers bridging wire protocols to the execution
//! bridge. The memory server owns the simulation lifetime: when its
//! one client goes away, the whole bridge shuts down. The signal
//! server accepts any number of consecutive control sessions.

pub mod memory;
pub mod net;
pub mod signal;

use std::time::Duration;

/// Transport tunables shared by both servers.
#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    /// Socket read timeout. One elapsed timeout with no bytes counts
    /// as an idle period.
    pub read_timeout: Duration,
    /// Consecutive idle periods after at least one message before the
    /// memory server declares the agent gone.
    pub max_idle_strikes: u32,
    /// How often a listener re-polls `accept` while waiting.
    pub accept_poll: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(2),
            max_idle_strikes: 3,
            accept_poll: Duration::from_millis(10),
        }
    }
}
