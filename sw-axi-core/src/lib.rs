//! Software side of the SW-AXI interconnect.
//!
//! A [`Bridge`] connects to a router over a Unix domain socket, registers local IP blocks
//! (software [`Slave`]s and [`Master`]s), learns about every other connected system, and then
//! shuttles bus transactions between the local IP and the rest of the interconnect.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod address_range;
pub mod bridge;
pub mod bus;
pub mod config;
pub mod error;
pub mod master;
pub mod queue;
pub mod resources;
pub mod session;
pub mod transaction;
pub mod transport;
pub mod wire;

#[cfg(test)]
mod testing;

pub use address_range::AddressRange;
pub use bridge::Bridge;
pub use bus::{Slave, SlaveError};
pub use config::Config;
pub use error::{Error, Result};
pub use master::{Completion, Master};
pub use session::{Incoming, SessionClient, State};
pub use transaction::{Buffer, Transaction, TransactionType};

/// Properties of a connected system.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Name the system chose for itself when connecting.
    pub name: String,
    /// Platform and toolchain, e.g. `Linux Rust`.
    pub system_name: String,
    pub pid: u64,
    pub hostname: String,
}

impl SystemInfo {
    /// Describe the current process, connecting under `name`.
    pub fn local(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            system_name: format!("{} Rust", capitalize(std::env::consts::OS)),
            pid: u64::from(std::process::id()),
            hostname: gethostname::gethostname().to_string_lossy().into_owned(),
        }
    }
}

impl fmt::Display for SystemInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<20} {:<25} {}:{}",
            self.name, self.system_name, self.hostname, self.pid
        )
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Bus role of a registered IP block.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum IpType {
    Slave,
    SlaveLite,
    SlaveStream,
    Master,
    MasterLite,
    MasterStream,
}

impl IpType {
    pub fn is_master(self) -> bool {
        matches!(self, Self::Master | Self::MasterLite | Self::MasterStream)
    }

    pub fn is_slave(self) -> bool {
        !self.is_master()
    }
}

impl fmt::Display for IpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            IpType::Slave => "SLAVE",
            IpType::SlaveLite => "SLAVE LITE",
            IpType::SlaveStream => "SLAVE STREAM",
            IpType::Master => "MASTER",
            IpType::MasterLite => "MASTER LITE",
            IpType::MasterStream => "MASTER STREAM",
        })
    }
}

/// Whether an IP block lives in software or in the simulated hardware.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum IpImplementation {
    Software,
    Hardware,
}

/// Information about an IP block.
///
/// The address space is described by its base `address` and `size`; use
/// [`range`](Self::range) for the start/end view.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct IpConfig {
    pub name: String,
    /// Base address of the block.
    pub address: u64,
    /// Size of the address space allocated to the block.
    pub size: u64,
    /// Number of the first interrupt allocated to the block.
    pub first_interrupt: u16,
    /// Number of interrupts allocated to the block.
    pub num_interrupts: u16,
    pub ip_type: IpType,
    pub implementation: IpImplementation,
    /// Router-assigned id; `None` until the router echoes the block back after the commit.
    pub id: Option<u64>,
}

impl IpConfig {
    /// A software slave (full AXI) covering `size` bytes at `address`.
    pub fn slave(name: impl Into<String>, address: u64, size: u64) -> Self {
        Self {
            name: name.into(),
            address,
            size,
            first_interrupt: 0,
            num_interrupts: 0,
            ip_type: IpType::Slave,
            implementation: IpImplementation::Software,
            id: None,
        }
    }

    /// A software master. Masters don't occupy any address space.
    pub fn master(name: impl Into<String>) -> Self {
        Self {
            ip_type: IpType::Master,
            ..Self::slave(name, 0, 0)
        }
    }

    pub fn with_type(mut self, ip_type: IpType) -> Self {
        self.ip_type = ip_type;
        self
    }

    pub fn with_implementation(mut self, implementation: IpImplementation) -> Self {
        self.implementation = implementation;
        self
    }

    pub fn with_interrupts(mut self, first_interrupt: u16, num_interrupts: u16) -> Self {
        self.first_interrupt = first_interrupt;
        self.num_interrupts = num_interrupts;
        self
    }

    /// Returns the address range of this block, or `None` if it doesn't occupy any address
    /// space (zero size) or the range doesn't fit the address space.
    pub fn range(&self) -> Option<AddressRange> {
        AddressRange::from_base_size(self.address, self.size)
    }
}

impl fmt::Display for IpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let implementation = match self.implementation {
            IpImplementation::Software => "[SW]",
            IpImplementation::Hardware => "[HW]",
        };
        write!(
            f,
            "{implementation} [{:<13}] address: [{:#018x}+{:#018x}] interrupts: [{:05}+{:05}] {}",
            self.ip_type.to_string(),
            self.address,
            self.size,
            self.first_interrupt,
            self.num_interrupts,
            self.name
        )
    }
}
