//! Bus fabric composition: address regions, translation, protocol bridging
//! and master-to-slave routing.
//!
//! This module provides:
//! - The address region table (non-overlapping named windows)
//! - Affine address translation between address spaces
//! - Bridges between the burst bus and the simple bus
//! - The fabric builder (elaboration) and the frozen fabric (routing)
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌──────────┐   ┌──────────┐
//!   │ CPU      │   │ PS GP0   │           masters
//!   │ (simple) │   │ (burst)  │
//!   └────┬─────┘   └────┬─────┘
//!        │         ┌────┴─────┐
//!        │         │ Bridge   │  burst -> simple
//!        │         └────┬─────┘
//!   ┌────┴──────────────┴───────────────────────┐
//!   │  Fabric: region decode + access check      │
//!   └────┬──────────────┬──────────────┬────────┘
//!        │         ┌────┴─────┐   ┌────┴─────┐
//!        │         │Translate │   │Translate │
//!        │         │ + Bridge │   │ + Bridge │
//!   ┌────┴─────┐   └────┬─────┘   └────┬─────┘
//!   │ SRAM     │   ┌────┴─────┐   ┌────┴─────┐
//!   │ CSR      │   │ PS DDR   │   │ PS IO    │   slaves
//!   └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use soc_fabric::fabric::{
//!     Access, AccessMode, FabricBuilder, FabricConfig, Port, Region,
//! };
//!
//! let mut builder = FabricBuilder::new(FabricConfig::default());
//! let cpu = builder.attach_master(Port::simple("cpu", 32, 32));
//! let sram = builder
//!     .attach_slave(
//!         Port::simple("sram", 32, 32),
//!         Region::new("sram", 0x1000_0000, 0x2000, AccessMode::RWX),
//!         None,
//!     )
//!     .unwrap();
//! builder.connect(cpu, sram).unwrap();
//!
//! let fabric = builder.finalize();
//! let target = fabric.route(cpu, 0x1000_0010, Access::Write).unwrap();
//! assert_eq!(target.slave, sram);
//! assert_eq!(target.address, 0x1000_0010);
//! ```

pub mod region;
pub mod translation;
pub mod bridge;
pub mod bus;

pub use region::{Region, RegionError, RegionTable};
pub use translation::{AddressRange, OutOfRangeError, Translation};
pub use bridge::{
    BeatResponse, Bridge, BridgeError, BridgeKind, BridgeSpec, BurstKind, BurstOp,
    BurstRequest, BurstToSimple, BusResponse, SimpleRequest, SimpleResponse, SimpleToBurst,
};
pub use bus::{
    Fabric, FabricBuilder, FabricConfig, FabricError, MemoryMapEntry, RouteTarget, RoutingError,
};

use std::fmt;
use std::str::FromStr;

/// Identifier of a master attached to the fabric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MasterId(pub(crate) u32);

impl MasterId {
    /// Raw index, in attach order.
    pub fn index(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for MasterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "master#{}", self.0)
    }
}

/// Identifier of a slave attached to the fabric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlaveId(pub(crate) u32);

impl SlaveId {
    /// Raw index, in attach order.
    pub fn index(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SlaveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slave#{}", self.0)
    }
}

/// Bus protocol spoken by a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Register/transaction bus: one single-beat transaction at a time.
    SimpleBus,
    /// Burst bus: tagged, multi-beat, multiple outstanding transactions.
    BurstBus,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::SimpleBus => f.pad("simple-bus"),
            Protocol::BurstBus => f.pad("burst-bus"),
        }
    }
}

/// Name of a port, as given by the component that owns it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortId(String);

impl PortId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

/// Protocol-facing connection point of a master or slave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    /// Port name
    pub id: PortId,
    /// Protocol spoken on this port
    pub protocol: Protocol,
    /// Data width in bits
    pub data_width: u32,
    /// Address width in bits
    pub address_width: u32,
    /// Transaction tag width in bits (burst bus only, 0 otherwise)
    pub id_width: u32,
}

impl Port {
    /// Create a simple-bus port.
    pub fn simple(name: impl Into<String>, data_width: u32, address_width: u32) -> Self {
        Self {
            id: PortId::new(name),
            protocol: Protocol::SimpleBus,
            data_width,
            address_width,
            id_width: 0,
        }
    }

    /// Create a burst-bus port.
    pub fn burst(name: impl Into<String>, data_width: u32, address_width: u32, id_width: u32) -> Self {
        Self {
            id: PortId::new(name),
            protocol: Protocol::BurstBus,
            data_width,
            address_width,
            id_width,
        }
    }

    /// Data width in bytes.
    #[inline]
    pub fn data_bytes(&self) -> u64 {
        u64::from(self.data_width / 8)
    }

    /// Highest address this port can present.
    #[inline]
    pub fn max_address(&self) -> u64 {
        max_address(self.address_width)
    }
}

/// Highest address representable with `width` address bits.
pub(crate) fn max_address(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Kind of access a master performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    Read,
    Write,
    /// Instruction fetch
    Execute,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Read => write!(f, "read"),
            Access::Write => write!(f, "write"),
            Access::Execute => write!(f, "execute"),
        }
    }
}

/// Set of accesses a region permits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessMode {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl AccessMode {
    pub const R: Self = Self { read: true, write: false, execute: false };
    pub const RW: Self = Self { read: true, write: true, execute: false };
    pub const RX: Self = Self { read: true, write: false, execute: true };
    pub const RWX: Self = Self { read: true, write: true, execute: true };

    /// Check whether this mode permits an access.
    #[inline]
    pub fn permits(&self, access: Access) -> bool {
        match access {
            Access::Read => self.read,
            Access::Write => self.write,
            Access::Execute => self.execute,
        }
    }
}

impl Default for AccessMode {
    fn default() -> Self {
        Self::RWX
    }
}

impl FromStr for AccessMode {
    type Err = RegionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut mode = AccessMode { read: false, write: false, execute: false };
        for c in s.chars() {
            let flag = match c {
                'r' => &mut mode.read,
                'w' => &mut mode.write,
                'x' => &mut mode.execute,
                _ => return Err(RegionError::InvalidMode(s.to_string())),
            };
            if *flag {
                return Err(RegionError::InvalidMode(s.to_string()));
            }
            *flag = true;
        }
        if mode == (AccessMode { read: false, write: false, execute: false }) {
            return Err(RegionError::InvalidMode(s.to_string()));
        }
        Ok(mode)
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.read {
            f.write_str("r")?;
        }
        if self.write {
            f.write_str("w")?;
        }
        if self.execute {
            f.write_str("x")?;
        }
        Ok(())
    }
}
