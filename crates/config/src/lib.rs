// SimBridge - HW/SW Co-Simulation Bridge
// Copyright (C) 2026 SimBridge Contributors
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! YAML bridge manifest: socket paths, backend selection, register
//! space geometry and the pin signal table.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use simbridge_protocol::signal::SignalDir;
use std::path::Path;

/// Default schema version for YAML configs
fn default_schema_version() -> String {
    "1.0".to_string()
}

fn default_memory_socket() -> String {
    "/tmp/simbridge-mem.sock".to_string()
}

fn default_signal_socket() -> String {
    "/tmp/simbridge-sig.sock".to_string()
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_us() -> u64 {
    100
}

fn default_register_space() -> String {
    "64B".to_string()
}

/// Who produces memory traffic: an external execution agent over the
/// memory socket, or an in-process CPU emulator driving a
/// `BridgePort` directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Agent,
    Emulator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[serde(alias = "input")]
    In,
    #[serde(alias = "output")]
    Out,
}

impl From<Direction> for SignalDir {
    fn from(d: Direction) -> Self {
        match d {
            Direction::In => SignalDir::In,
            Direction::Out => SignalDir::Out,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    pub name: String,
    /// Width in bits, 1..=32.
    pub width: u8,
    pub direction: Direction,
    /// Byte offset into the register space backing this signal.
    pub offset: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeManifest {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_memory_socket")]
    pub memory_socket: String,
    #[serde(default = "default_signal_socket")]
    pub signal_socket: String,
    /// Whether to run the signal-protocol server at all.
    #[serde(default = "default_true")]
    pub signal_bridge: bool,
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default = "default_poll_interval_us")]
    pub poll_interval_us: u64,
    /// Register space size, e.g. "64B" or "4KB".
    #[serde(default = "default_register_space")]
    pub register_space: String,
    #[serde(default)]
    pub signals: Vec<SignalConfig>,
}

impl Default for BridgeManifest {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            name: None,
            memory_socket: default_memory_socket(),
            signal_socket: default_signal_socket(),
            signal_bridge: true,
            backend: BackendKind::default(),
            poll_interval_us: default_poll_interval_us(),
            register_space: default_register_space(),
            signals: Vec::new(),
        }
    }
}

impl BridgeManifest {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read bridge manifest at {:?}", path.as_ref()))?;
        let manifest: Self =
            serde_yaml::from_str(&contents).context("Failed to parse bridge manifest YAML")?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Register space size in bytes.
    pub fn register_space_bytes(&self) -> Result<u64> {
        parse_size(&self.register_space)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            bail!(
                "Unsupported schema_version: {} (expected \"1.0\")",
                self.schema_version
            );
        }
        let space = self.register_space_bytes()?;
        if space == 0 {
            bail!("register_space must be non-zero");
        }
        if self.signals.len() > u8::MAX as usize {
            bail!("too many signals: {} (max 255)", self.signals.len());
        }
        for sig in &self.signals {
            if sig.name.is_empty() || sig.name.len() > u8::MAX as usize {
                bail!("signal name must be 1..=255 bytes: {:?}", sig.name);
            }
            if sig.width == 0 || sig.width > 32 {
                bail!("signal '{}': width must be 1..=32 bits", sig.name);
            }
            let bytes = u64::from(sig.width.div_ceil(8));
            if sig.offset.checked_add(bytes).map_or(true, |end| end > space) {
                bail!(
                    "signal '{}': offset {:#x} reaches past register space ({} bytes)",
                    sig.name,
                    sig.offset,
                    space
                );
            }
        }
        let mut names: Vec<&str> = self.signals.iter().map(|s| s.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        if names.len() != self.signals.len() {
            bail!("signal names must be unique");
        }
        Ok(())
    }
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = size_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}
