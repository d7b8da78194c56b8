//! Address region table for the global address space.
//!
//! The table is the authoritative map from region names to address windows.
//! Bus regions never overlap: a registration that would create an overlap
//! fails and leaves the table exactly as it was.
//!
//! Two further kinds of entries are tracked alongside the bus regions:
//!
//! - **Linker regions** are exported in the memory map for software (linker
//!   scripts, headers) but are not decoded by the bus, so they are allowed
//!   to shadow a bus region (a boot ROM image placed over a flash window).
//! - **IO windows** are the uncached apertures declared by the CPU. An
//!   uncached region must lie inside one; a cached region must stay out.
//!
//! ```text
//!  0x0000_0000 ┌────────────┐
//!              │ rom   rx   │
//!              ├────────────┤
//!  0x1000_0000 │ sram  rwx  │
//!              ├────────────┤ ─┐
//!  0x8000_0000 │ ps_io rw   │  │ IO window (uncached)
//!              ├────────────┤  │
//!  0xF000_0000 │ csr   rw   │  │
//!              └────────────┘ ─┘
//! ```
//!
//! Once frozen (at fabric finalization) the table rejects every mutation.
//!
//! # Usage
//!
//! ```
//! use soc_fabric::fabric::{AccessMode, Region, RegionTable};
//!
//! let mut table = RegionTable::new();
//! table.register(Region::new("sram", 0x1000, 0x1000, AccessMode::RWX)).unwrap();
//!
//! // Overlapping registration fails, table unchanged
//! assert!(table.register(Region::new("rom", 0x1800, 0x1000, AccessMode::RX)).is_err());
//! assert_eq!(table.len(), 1);
//!
//! assert_eq!(table.lookup(0x1234).unwrap().name, "sram");
//! ```

use std::collections::BTreeMap;

use thiserror::Error;

use super::translation::AddressRange;
use super::{AccessMode, MasterId};

/// A named window in the global address space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    /// Region name (e.g., "sram", "main_ram", "csr")
    pub name: String,
    /// First address of the region
    pub origin: u64,
    /// Size in bytes
    pub size: u64,
    /// Accesses the region permits
    pub mode: AccessMode,
    /// Whether the CPU may cache accesses to this region
    pub cached: bool,
    /// Exported for software only, not decoded by the bus
    pub linker: bool,
    /// Master this region is private to, if any
    pub owner: Option<MasterId>,
}

impl Region {
    /// Create a cached bus region with no owner.
    pub fn new(name: impl Into<String>, origin: u64, size: u64, mode: AccessMode) -> Self {
        Self {
            name: name.into(),
            origin,
            size,
            mode,
            cached: true,
            linker: false,
            owner: None,
        }
    }

    /// Mark the region as uncached (IO).
    pub fn uncached(mut self) -> Self {
        self.cached = false;
        self
    }

    /// Mark the region as linker-only.
    pub fn linker(mut self) -> Self {
        self.linker = true;
        self
    }

    /// Make the region private to one master.
    pub fn owned_by(mut self, master: MasterId) -> Self {
        self.owner = Some(master);
        self
    }

    #[inline]
    pub fn range(&self) -> AddressRange {
        AddressRange::new(self.origin, self.size)
    }

    /// Exclusive end address.
    #[inline]
    pub fn end(&self) -> u64 {
        self.range().end()
    }

    #[inline]
    pub fn contains(&self, addr: u64) -> bool {
        self.range().contains(addr)
    }

    #[inline]
    pub fn overlaps(&self, range: &AddressRange) -> bool {
        self.range().overlaps(range)
    }
}

/// Error type for region table operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegionError {
    #[error("region '{name}' overlaps with '{conflicting_name}'")]
    Overlap { name: String, conflicting_name: String },

    #[error("region '{0}' has zero size")]
    ZeroSize(String),

    #[error("region '{0}' is already registered")]
    DuplicateName(String),

    #[error("region '{name}' at 0x{origin:08x} + 0x{size:x} wraps the address space")]
    AddressOverflow { name: String, origin: u64, size: u64 },

    #[error("uncached region '{name}' {range} is not inside an IO window")]
    NotInIoWindow { name: String, range: AddressRange },

    #[error("cached region '{name}' overlaps IO window {window}")]
    CachedInIoWindow { name: String, window: AddressRange },

    #[error("no free space for region '{name}' of 0x{size:x} bytes in {search}")]
    NoSpace { name: String, size: u64, search: AddressRange },

    #[error("region '{0}' not found")]
    NotFound(String),

    #[error("invalid access mode '{0}'")]
    InvalidMode(String),

    #[error("region table is frozen")]
    Frozen,
}

/// Table of non-overlapping bus regions, plus linker regions and IO windows.
#[derive(Debug, Clone, Default)]
pub struct RegionTable {
    /// Bus regions keyed by origin (disjoint, so origins are unique)
    regions: BTreeMap<u64, Region>,
    /// Linker-only regions, in registration order
    linker_regions: Vec<Region>,
    /// Uncached apertures
    io_windows: Vec<AddressRange>,
    frozen: bool,
}

impl RegionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an uncached IO window.
    pub fn add_io_window(&mut self, window: AddressRange) -> Result<(), RegionError> {
        self.check_mutable()?;
        let name = format!("io@0x{:08x}", window.base);
        if window.size == 0 {
            return Err(RegionError::ZeroSize(name));
        }
        if let Some(existing) = self.io_windows.iter().find(|w| w.overlaps(&window)) {
            return Err(RegionError::Overlap {
                name,
                conflicting_name: format!("io@0x{:08x}", existing.base),
            });
        }
        log::debug!("IO window {}", window);
        self.io_windows.push(window);
        Ok(())
    }

    /// Register a region.
    ///
    /// Atomic: on any error the table is left unchanged.
    pub fn register(&mut self, region: Region) -> Result<(), RegionError> {
        self.check_mutable()?;
        self.validate(&region)?;

        if region.linker {
            log::debug!("Linker region '{}' {} {}", region.name, region.range(), region.mode);
            self.linker_regions.push(region);
        } else {
            log::debug!(
                "Region '{}' {} {}{}",
                region.name,
                region.range(),
                region.mode,
                if region.cached { "" } else { " uncached" }
            );
            self.regions.insert(region.origin, region);
        }
        Ok(())
    }

    /// Check a region against the table without registering it.
    pub fn validate(&self, region: &Region) -> Result<(), RegionError> {
        if region.size == 0 {
            return Err(RegionError::ZeroSize(region.name.clone()));
        }
        if region.origin.checked_add(region.size).is_none() {
            return Err(RegionError::AddressOverflow {
                name: region.name.clone(),
                origin: region.origin,
                size: region.size,
            });
        }
        if self.get(&region.name).is_some() {
            return Err(RegionError::DuplicateName(region.name.clone()));
        }
        if region.linker {
            return Ok(());
        }

        let range = region.range();
        if region.cached {
            if let Some(window) = self.io_windows.iter().find(|w| w.overlaps(&range)) {
                return Err(RegionError::CachedInIoWindow {
                    name: region.name.clone(),
                    window: *window,
                });
            }
        } else if !self.io_windows.iter().any(|w| w.contains_range(&range)) {
            return Err(RegionError::NotInIoWindow { name: region.name.clone(), range });
        }

        if let Some(existing) = self.first_overlap(&range) {
            return Err(RegionError::Overlap {
                name: region.name.clone(),
                conflicting_name: existing.name.clone(),
            });
        }
        Ok(())
    }

    /// Remove a region by name.
    pub fn remove(&mut self, name: &str) -> Result<Region, RegionError> {
        self.check_mutable()?;
        if let Some(origin) = self.regions.values().find(|r| r.name == name).map(|r| r.origin) {
            if let Some(region) = self.regions.remove(&origin) {
                log::debug!("Removed region '{}'", name);
                return Ok(region);
            }
        }
        if let Some(index) = self.linker_regions.iter().position(|r| r.name == name) {
            log::debug!("Removed linker region '{}'", name);
            return Ok(self.linker_regions.remove(index));
        }
        Err(RegionError::NotFound(name.to_string()))
    }

    /// Reserve a region at the lowest free origin inside `search`.
    ///
    /// The origin is aligned to the size rounded up to a power of two, so the
    /// region can be decoded from the upper address bits alone.
    pub fn allocate(
        &mut self,
        name: impl Into<String>,
        size: u64,
        mode: AccessMode,
        cached: bool,
        search: AddressRange,
    ) -> Result<Region, RegionError> {
        self.check_mutable()?;
        let name = name.into();
        if size == 0 {
            return Err(RegionError::ZeroSize(name));
        }
        let no_space = |name: String| RegionError::NoSpace { name, size, search };
        let align = match size.checked_next_power_of_two() {
            Some(align) => align,
            None => return Err(no_space(name)),
        };

        let mut candidate = align_up(search.base, align);
        loop {
            let origin = match candidate {
                Some(origin) => origin,
                None => return Err(no_space(name)),
            };
            let range = AddressRange::new(origin, size);
            match origin.checked_add(size) {
                Some(end) if end <= search.end() => {}
                _ => return Err(no_space(name)),
            }
            match self.first_overlap(&range) {
                Some(existing) => candidate = align_up(existing.end(), align),
                None => break,
            }
        }

        let origin = candidate.ok_or_else(|| no_space(name.clone()))?;
        let mut region = Region::new(name, origin, size, mode);
        region.cached = cached;
        self.register(region.clone())?;
        log::info!("Allocated region '{}' at {}", region.name, region.range());
        Ok(region)
    }

    /// Find the bus region containing an address.
    pub fn lookup(&self, addr: u64) -> Option<&Region> {
        self.regions
            .range(..=addr)
            .next_back()
            .map(|(_, region)| region)
            .filter(|region| region.contains(addr))
    }

    /// Get a region (bus or linker) by name.
    pub fn get(&self, name: &str) -> Option<&Region> {
        self.regions
            .values()
            .chain(self.linker_regions.iter())
            .find(|r| r.name == name)
    }

    /// Bus regions in ascending address order.
    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.values()
    }

    pub fn linker_regions(&self) -> &[Region] {
        &self.linker_regions
    }

    pub fn io_windows(&self) -> &[AddressRange] {
        &self.io_windows
    }

    /// Number of bus regions.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Make the table read-only for the rest of its lifetime.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn check_mutable(&self) -> Result<(), RegionError> {
        if self.frozen {
            Err(RegionError::Frozen)
        } else {
            Ok(())
        }
    }

    /// Bus region overlapping `range`, if any.
    ///
    /// Regions are disjoint, so only the last region starting before the end
    /// of `range` can overlap it.
    fn first_overlap(&self, range: &AddressRange) -> Option<&Region> {
        self.regions
            .range(..range.end())
            .next_back()
            .map(|(_, region)| region)
            .filter(|region| region.overlaps(range))
    }
}

fn align_up(addr: u64, align: u64) -> Option<u64> {
    let mask = align - 1;
    addr.checked_add(mask).map(|a| a & !mask)
}
