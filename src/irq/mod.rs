//! Interrupt aggregation.
//!
//! An [`EventManager`] collects named event sources into one interrupt line
//! and exposes them to the supervising CPU as a small register file:
//!
//! ```text
//!   base + 0·stride   status    live trigger levels          (read-only)
//!   base + 1·stride   pending   latched events, write 1 to clear
//!   base + 2·stride   enable    per-source mask              (read/write)
//!
//!   irq = OR(pending & enable)
//! ```
//!
//! Source `i` occupies bit `i` of each register (or bit `width-1-i` with
//! [`BitOrder::MsbFirst`]).
//!
//! Two kinds of sources are supported:
//!
//! - **Level**: `pending` follows the external condition. Acknowledging has
//!   no lasting effect while the condition stays asserted.
//! - **Pulse**: `pending` latches on a rising edge of the condition and stays
//!   set until acknowledged, even after the condition drops.
//!
//! # Example
//!
//! ```
//! use soc_fabric::irq::{EventKind, EventManager, RegisterLayout};
//!
//! let mut ev = EventManager::new("uart", RegisterLayout::new(0xF000_0800, 4)).unwrap();
//! let rx = ev.declare("rx", EventKind::Pulse).unwrap();
//! ev.set_enable(rx, true).unwrap();
//!
//! ev.drive(rx, true).unwrap();
//! ev.drive(rx, false).unwrap();
//! assert!(ev.combined_irq());
//!
//! ev.ack(rx).unwrap();
//! assert!(!ev.combined_irq());
//! ```

mod map;

pub use map::InterruptMap;

use std::fmt;

use thiserror::Error;

use crate::fabric::AddressRange;

/// Widest register the aggregator exposes.
pub const MAX_REGISTER_WIDTH: u32 = 32;

/// Error type for interrupt aggregation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IrqError {
    #[error("register width {0} must be between 1 and 32")]
    InvalidWidth(u32),

    #[error("register stride must be non-zero")]
    ZeroStride,

    #[error("registers at 0x{base:x} with stride 0x{stride:x} wrap the address space")]
    LayoutOverflow { base: u64, stride: u64 },

    #[error("event manager '{manager}' is full ({width} sources)")]
    TooManySources { manager: String, width: u32 },

    #[error("event '{0}' is already declared")]
    DuplicateEvent(String),

    #[error("unknown event {0}")]
    UnknownEvent(EventId),

    #[error("unknown event '{0}'")]
    UnknownName(String),

    #[error("no event register at 0x{0:08x}")]
    UnknownRegister(u64),

    #[error("register at 0x{0:08x} is read-only")]
    ReadOnly(u64),

    #[error("interrupt '{0}' is already mapped")]
    DuplicateInterrupt(String),

    #[error("interrupt line {line} is already used by '{holder}'")]
    LineInUse { line: u32, holder: String },

    #[error("interrupt line {line} is out of range (0..{lines})")]
    LineOutOfRange { line: u32, lines: u32 },

    #[error("no free interrupt line for '{0}'")]
    NoFreeLine(String),
}

/// How a source's pending bit follows its trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Level,
    Pulse,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Level => write!(f, "level"),
            EventKind::Pulse => write!(f, "pulse"),
        }
    }
}

/// Index of a source within its manager, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(usize);

impl EventId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event#{}", self.0)
    }
}

/// One interrupt-capable condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSource {
    pub name: String,
    pub kind: EventKind,
    /// Live level of the external condition
    trigger: bool,
    /// Latched edge (pulse sources only)
    latched: bool,
    enabled: bool,
}

impl EventSource {
    fn new(name: String, kind: EventKind) -> Self {
        Self {
            name,
            kind,
            trigger: false,
            latched: false,
            enabled: false,
        }
    }

    pub fn trigger(&self) -> bool {
        self.trigger
    }

    pub fn pending(&self) -> bool {
        match self.kind {
            EventKind::Level => self.trigger,
            EventKind::Pulse => self.latched,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

/// Bit assignment of sources within a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitOrder {
    /// Source 0 in bit 0
    #[default]
    LsbFirst,
    /// Source 0 in bit `width - 1`
    MsbFirst,
}

/// Placement of the register file in the CPU's address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterLayout {
    /// Address of the status register
    pub base: u64,
    /// Distance between consecutive registers
    pub stride: u64,
    /// Register width in bits
    pub width: u32,
    pub bit_order: BitOrder,
}

impl RegisterLayout {
    /// 32-bit, LSB-first layout.
    pub fn new(base: u64, stride: u64) -> Self {
        Self {
            base,
            stride,
            width: MAX_REGISTER_WIDTH,
            bit_order: BitOrder::LsbFirst,
        }
    }

    pub fn with_width(mut self, width: u32) -> Self {
        self.width = width;
        self
    }

    pub fn with_bit_order(mut self, bit_order: BitOrder) -> Self {
        self.bit_order = bit_order;
        self
    }

    pub fn status_addr(&self) -> u64 {
        self.base
    }

    pub fn pending_addr(&self) -> u64 {
        self.base + self.stride
    }

    pub fn enable_addr(&self) -> u64 {
        self.base + 2 * self.stride
    }

    /// Address range covered by the three registers.
    pub fn range(&self) -> AddressRange {
        AddressRange::new(self.base, 3 * self.stride)
    }

    fn validate(&self) -> Result<(), IrqError> {
        if self.width == 0 || self.width > MAX_REGISTER_WIDTH {
            return Err(IrqError::InvalidWidth(self.width));
        }
        if self.stride == 0 {
            return Err(IrqError::ZeroStride);
        }
        // The whole register file, end included, must be addressable.
        if self.stride.checked_mul(3).and_then(|span| self.base.checked_add(span)).is_none() {
            return Err(IrqError::LayoutOverflow { base: self.base, stride: self.stride });
        }
        Ok(())
    }

    fn bit(&self, index: usize) -> u32 {
        // index < width <= 32, checked at declare time
        let index = index as u32;
        match self.bit_order {
            BitOrder::LsbFirst => 1 << index,
            BitOrder::MsbFirst => 1 << (self.width - 1 - index),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Register {
    Status,
    Pending,
    Enable,
}

/// A named collection of event sources with one combined interrupt output.
#[derive(Debug, Clone)]
pub struct EventManager {
    name: String,
    layout: RegisterLayout,
    sources: Vec<EventSource>,
}

impl EventManager {
    pub fn new(name: impl Into<String>, layout: RegisterLayout) -> Result<Self, IrqError> {
        layout.validate()?;
        Ok(Self {
            name: name.into(),
            layout,
            sources: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layout(&self) -> &RegisterLayout {
        &self.layout
    }

    /// Declare a new source. Sources start idle and disabled.
    pub fn declare(&mut self, name: impl Into<String>, kind: EventKind) -> Result<EventId, IrqError> {
        let name = name.into();
        if self.sources.iter().any(|s| s.name == name) {
            return Err(IrqError::DuplicateEvent(name));
        }
        if self.sources.len() >= self.layout.width as usize {
            return Err(IrqError::TooManySources {
                manager: self.name.clone(),
                width: self.layout.width,
            });
        }
        let id = EventId(self.sources.len());
        log::debug!("{}: declared {} source '{}' as {}", self.name, kind, name, id);
        self.sources.push(EventSource::new(name, kind));
        Ok(id)
    }

    /// Look up a source by name.
    pub fn id(&self, name: &str) -> Result<EventId, IrqError> {
        self.sources
            .iter()
            .position(|s| s.name == name)
            .map(EventId)
            .ok_or_else(|| IrqError::UnknownName(name.to_string()))
    }

    pub fn source(&self, id: EventId) -> Result<&EventSource, IrqError> {
        self.sources.get(id.0).ok_or(IrqError::UnknownEvent(id))
    }

    pub fn sources(&self) -> impl Iterator<Item = (EventId, &EventSource)> {
        self.sources.iter().enumerate().map(|(i, s)| (EventId(i), s))
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    fn source_mut(&mut self, id: EventId) -> Result<&mut EventSource, IrqError> {
        self.sources.get_mut(id.0).ok_or(IrqError::UnknownEvent(id))
    }

    /// Feed the external condition of a source.
    pub fn drive(&mut self, id: EventId, level: bool) -> Result<(), IrqError> {
        let manager = &self.name;
        let source = self.sources.get_mut(id.0).ok_or(IrqError::UnknownEvent(id))?;
        if source.kind == EventKind::Pulse && level && !source.trigger {
            log::trace!("{}: '{}' rising edge latched", manager, source.name);
            source.latched = true;
        }
        source.trigger = level;
        Ok(())
    }

    pub fn set_enable(&mut self, id: EventId, enabled: bool) -> Result<(), IrqError> {
        self.source_mut(id)?.enabled = enabled;
        Ok(())
    }

    /// Clear a source's pending state.
    ///
    /// Level sources re-assert immediately while their condition holds.
    pub fn ack(&mut self, id: EventId) -> Result<(), IrqError> {
        let source = self.source_mut(id)?;
        source.latched = false;
        Ok(())
    }

    fn mask_of(&self, f: impl Fn(&EventSource) -> bool) -> u32 {
        self.sources
            .iter()
            .enumerate()
            .filter(|(_, s)| f(s))
            .fold(0, |mask, (i, _)| mask | self.layout.bit(i))
    }

    /// Live trigger levels.
    pub fn status_mask(&self) -> u32 {
        self.mask_of(EventSource::trigger)
    }

    pub fn pending_mask(&self) -> u32 {
        self.mask_of(EventSource::pending)
    }

    pub fn enabled_mask(&self) -> u32 {
        self.mask_of(EventSource::enabled)
    }

    /// OR over sources of `pending && enabled`.
    pub fn combined_irq(&self) -> bool {
        self.sources.iter().any(|s| s.pending() && s.enabled)
    }

    fn decode(&self, addr: u64) -> Result<Register, IrqError> {
        let layout = &self.layout;
        if addr == layout.status_addr() {
            Ok(Register::Status)
        } else if addr == layout.pending_addr() {
            Ok(Register::Pending)
        } else if addr == layout.enable_addr() {
            Ok(Register::Enable)
        } else {
            Err(IrqError::UnknownRegister(addr))
        }
    }

    /// CPU read of a register.
    pub fn read_register(&self, addr: u64) -> Result<u32, IrqError> {
        Ok(match self.decode(addr)? {
            Register::Status => self.status_mask(),
            Register::Pending => self.pending_mask(),
            Register::Enable => self.enabled_mask(),
        })
    }

    /// CPU write of a register.
    ///
    /// Writing 1 to a pending bit acknowledges that source. Bits with no
    /// source behind them are ignored.
    pub fn write_register(&mut self, addr: u64, value: u32) -> Result<(), IrqError> {
        let register = self.decode(addr)?;
        log::trace!("{}: write 0x{:08x} <- 0x{:08x}", self.name, addr, value);
        match register {
            Register::Status => return Err(IrqError::ReadOnly(addr)),
            Register::Pending => {
                for i in 0..self.sources.len() {
                    if value & self.layout.bit(i) != 0 {
                        self.sources[i].latched = false;
                    }
                }
            }
            Register::Enable => {
                for i in 0..self.sources.len() {
                    self.sources[i].enabled = value & self.layout.bit(i) != 0;
                }
            }
        }
        Ok(())
    }
}
