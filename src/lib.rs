//! soc-fabric library
//!
//! Bus fabric and address-space composition for a System-on-Chip:
//! region table, address translation, protocol bridges, routing and
//! interrupt aggregation, plus the Zybo Z7 board integration.

pub mod config;
pub mod fabric;
pub mod irq;
pub mod soc;
