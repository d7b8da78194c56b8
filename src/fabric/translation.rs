//! Affine address translation between address spaces.
//!
//! A [`Translation`] maps a bounded source window onto a destination base:
//!
//! ```text
//! dest = addr - source.base + dest_base      for addr in [source.base, source.end)
//! ```
//!
//! Translations are plain values: they hold no state, so one instance can be
//! shared by every transaction crossing the same boundary. They are used to
//! rebase a slave's local address space into the global map, and to give a
//! master a different view of a shared region.
//!
//! # Example
//!
//! ```
//! use soc_fabric::fabric::{AddressRange, Translation};
//!
//! let ddr = Translation::new(AddressRange::new(0x4000_0000, 0x1000), 0x0008_0000);
//! assert_eq!(ddr.translate(0x4000_0010).unwrap(), 0x0008_0010);
//! assert!(ddr.translate(0x5000_0000).is_err());
//! ```

use std::fmt;

use thiserror::Error;

/// Half-open address range `[base, base + size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressRange {
    /// First address in the range
    pub base: u64,
    /// Size in bytes
    pub size: u64,
}

impl AddressRange {
    pub const fn new(base: u64, size: u64) -> Self {
        Self { base, size }
    }

    /// Exclusive end address (saturates at the top of the 64-bit space).
    #[inline]
    pub fn end(&self) -> u64 {
        self.base.saturating_add(self.size)
    }

    /// Last address in the range, or `None` for an empty range.
    #[inline]
    pub fn last(&self) -> Option<u64> {
        if self.size == 0 {
            None
        } else {
            Some(self.end() - 1)
        }
    }

    #[inline]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr < self.end()
    }

    /// Check if `other` lies entirely within this range.
    #[inline]
    pub fn contains_range(&self, other: &AddressRange) -> bool {
        other.base >= self.base && other.end() <= self.end()
    }

    #[inline]
    pub fn overlaps(&self, other: &AddressRange) -> bool {
        self.base < other.end() && other.base < self.end()
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[0x{:08x}, 0x{:08x})", self.base, self.end())
    }
}

/// Address outside a translation's source window.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("address 0x{address:08x} is outside translation window {window}")]
pub struct OutOfRangeError {
    /// Offending address
    pub address: u64,
    /// Source window of the translation
    pub window: AddressRange,
}

/// Fixed additive remap of a source window onto a destination base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Translation {
    source: AddressRange,
    dest_base: u64,
}

impl Translation {
    pub fn new(source_window: AddressRange, dest_base: u64) -> Self {
        Self { source: source_window, dest_base }
    }

    /// Translation that restricts accesses to `window` without moving them.
    pub fn identity(window: AddressRange) -> Self {
        Self::new(window, window.base)
    }

    pub fn source_window(&self) -> AddressRange {
        self.source
    }

    pub fn dest_base(&self) -> u64 {
        self.dest_base
    }

    /// The window addresses land in after translation.
    pub fn dest_window(&self) -> AddressRange {
        AddressRange::new(self.dest_base, self.source.size)
    }

    /// Translate a single address.
    #[inline]
    pub fn translate(&self, addr: u64) -> Result<u64, OutOfRangeError> {
        let out_of_range = || OutOfRangeError { address: addr, window: self.source };
        if !self.source.contains(addr) {
            return Err(out_of_range());
        }
        self.dest_base
            .checked_add(addr - self.source.base)
            .ok_or_else(out_of_range)
    }

    /// Translate a whole range; every address in it must be in the window.
    pub fn translate_range(&self, range: &AddressRange) -> Result<AddressRange, OutOfRangeError> {
        if !self.source.contains_range(range) {
            // Report the first address that falls outside.
            let address = if range.base < self.source.base {
                range.base
            } else {
                self.source.end()
            };
            return Err(OutOfRangeError { address, window: self.source });
        }
        let base = self.translate(range.base)?;
        if let Some(last) = range.last() {
            self.translate(last)?;
        }
        Ok(AddressRange::new(base, range.size))
    }
}

impl fmt::Display for Translation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> 0x{:08x}", self.source, self.dest_base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_inside_window() {
        let t = Translation::new(AddressRange::new(0x4000_0000, 0x1000), 0x0008_0000);
        assert_eq!(t.translate(0x4000_0000).unwrap(), 0x0008_0000);
        assert_eq!(t.translate(0x4000_0010).unwrap(), 0x0008_0010);
        assert_eq!(t.translate(0x4000_0FFF).unwrap(), 0x0008_0FFF);
    }

    #[test]
    fn test_translate_outside_window() {
        let t = Translation::new(AddressRange::new(0x4000_0000, 0x1000), 0x0008_0000);

        let err = t.translate(0x5000_0000).unwrap_err();
        assert_eq!(err.address, 0x5000_0000);
        assert_eq!(err.window, t.source_window());

        // End of the window is exclusive
        assert!(t.translate(0x4000_1000).is_err());
        assert!(t.translate(0x3FFF_FFFF).is_err());
    }

    #[test]
    fn test_translate_downward() {
        // Rebasing to a lower address than the source
        let t = Translation::new(AddressRange::new(0x8000_0000, 0x2000_0000), 0x0000_1000);
        assert_eq!(t.translate(0x8000_0004).unwrap(), 0x0000_1004);
    }

    #[test]
    fn test_identity() {
        let t = Translation::identity(AddressRange::new(0x4000_0000, 0x4000_0000));
        assert_eq!(t.translate(0x4000_1234).unwrap(), 0x4000_1234);
        assert!(t.translate(0x8000_0000).is_err());
    }

    #[test]
    fn test_translate_range() {
        let t = Translation::new(AddressRange::new(0x8000_0000, 0x2000_0000), 0xE000_0000);

        let inner = AddressRange::new(0x8000_1000, 0x1000);
        assert_eq!(t.translate_range(&inner).unwrap(), AddressRange::new(0xE000_1000, 0x1000));

        let straddling = AddressRange::new(0x9FFF_F000, 0x2000);
        let err = t.translate_range(&straddling).unwrap_err();
        assert_eq!(err.address, 0xA000_0000);
    }

    #[test]
    fn test_destination_overflow() {
        let t = Translation::new(AddressRange::new(0, 0x1000), u64::MAX - 0x10);
        assert!(t.translate(0x8).is_ok());
        assert!(t.translate(0x20).is_err());
    }

    #[test]
    fn test_range_overlap() {
        let a = AddressRange::new(0x1000, 0x1000);
        assert!(a.overlaps(&AddressRange::new(0x1800, 0x1000)));
        assert!(!a.overlaps(&AddressRange::new(0x2000, 0x1000)));
        assert!(!a.overlaps(&AddressRange::new(0x0, 0x1000)));
        assert_eq!(a.last(), Some(0x1FFF));
        assert_eq!(AddressRange::new(0x10, 0).last(), None);
    }
}
