//! Fabric elaboration and routing.
//!
//! Building a fabric happens in two phases:
//!
//! 1. **Elaboration**: a [`FabricBuilder`] accumulates masters, slaves,
//!    regions and reachability. Every call is validated and atomic: a failed
//!    call leaves the builder exactly as it was.
//! 2. **Execution**: [`FabricBuilder::finalize`] consumes the builder and
//!    produces an immutable [`Fabric`]. Routing on a fabric is a pure lookup
//!    and can be evaluated from any number of threads.
//!
//! # Routing
//!
//! ```text
//!  master addr ──► master view ──► region decode ──► reachability ──►
//!                  (optional)      (RegionTable)     + access mode
//!
//!              ──► slave translation ──► (SlaveId, slave address)
//!                  (optional)
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use thiserror::Error;

use super::bridge::BridgeSpec;
use super::region::{Region, RegionError, RegionTable};
use super::translation::{AddressRange, OutOfRangeError, Translation};
use super::{max_address, Access, AccessMode, MasterId, Port, Protocol, SlaveId};

/// Parameters of the fabric's internal bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FabricConfig {
    /// Protocol spoken inside the fabric
    pub protocol: Protocol,
    /// Data width in bits
    pub data_width: u32,
    /// Address width in bits
    pub address_width: u32,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::SimpleBus,
            data_width: 32,
            address_width: 32,
        }
    }
}

/// Configuration errors raised during elaboration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FabricError {
    #[error(transparent)]
    Region(#[from] RegionError),

    #[error(transparent)]
    OutOfRange(#[from] OutOfRangeError),

    #[error("unknown master {0}")]
    UnknownMaster(MasterId),

    #[error("unknown slave {0}")]
    UnknownSlave(SlaveId),

    #[error("translation window {window} does not cover region '{region}'")]
    TranslationMismatch { region: String, window: AddressRange },

    #[error("address 0x{address:x} of '{name}' exceeds the {width}-bit address space")]
    AddressWidth { name: String, address: u64, width: u32 },

    #[error("region '{0}' is fronted by a slave")]
    RegionInUse(String),

    #[error("linker region '{0}' cannot be decoded by a slave")]
    LinkerRegion(String),

    #[error("region '{region}' is owned by {owner}, not {master}")]
    OwnedByOtherMaster { region: String, owner: MasterId, master: MasterId },
}

/// Errors returned by [`Fabric::route`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("unknown master {0}")]
    UnknownMaster(MasterId),

    #[error("address 0x{address:08x} is not mapped for {master}")]
    AddressNotMapped { master: MasterId, address: u64 },

    #[error("{access} access denied to region '{region}' ({mode})")]
    AccessDenied { region: String, access: Access, mode: AccessMode },
}

/// Result of a successful route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteTarget {
    /// Slave that decodes the address
    pub slave: SlaveId,
    /// Address as presented to the slave
    pub address: u64,
}

#[derive(Debug, Clone)]
struct MasterEntry {
    port: Port,
    view: Option<Translation>,
    bridge: Option<BridgeSpec>,
}

#[derive(Debug, Clone)]
struct SlaveEntry {
    port: Port,
    region: String,
    translation: Option<Translation>,
    bridge: Option<BridgeSpec>,
}

/// One line of the exported memory map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryMapEntry {
    pub name: String,
    pub origin: u64,
    pub size: u64,
    pub mode: AccessMode,
    pub cached: bool,
    pub linker: bool,
}

impl From<&Region> for MemoryMapEntry {
    fn from(region: &Region) -> Self {
        Self {
            name: region.name.clone(),
            origin: region.origin,
            size: region.size,
            mode: region.mode,
            cached: region.cached,
            linker: region.linker,
        }
    }
}

impl fmt::Display for MemoryMapEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<12} 0x{:08x} 0x{:08x} {:<3} {}{}",
            self.name,
            self.origin,
            self.size,
            self.mode,
            if self.cached { "cached" } else { "io" },
            if self.linker { " linker" } else { "" }
        )
    }
}

/// Mutable fabric under elaboration.
#[derive(Debug, Clone)]
pub struct FabricBuilder {
    config: FabricConfig,
    regions: RegionTable,
    masters: BTreeMap<MasterId, MasterEntry>,
    slaves: BTreeMap<SlaveId, SlaveEntry>,
    reach: BTreeMap<MasterId, BTreeSet<SlaveId>>,
    next_master: u32,
    next_slave: u32,
}

impl FabricBuilder {
    pub fn new(config: FabricConfig) -> Self {
        Self {
            config,
            regions: RegionTable::new(),
            masters: BTreeMap::new(),
            slaves: BTreeMap::new(),
            reach: BTreeMap::new(),
            next_master: 0,
            next_slave: 0,
        }
    }

    pub fn config(&self) -> &FabricConfig {
        &self.config
    }

    pub fn regions(&self) -> &RegionTable {
        &self.regions
    }

    /// Declare an uncached IO window.
    pub fn add_io_window(&mut self, window: AddressRange) -> Result<(), FabricError> {
        self.check_width(&format!("io@0x{:08x}", window.base), &window, self.config.address_width)?;
        Ok(self.regions.add_io_window(window)?)
    }

    /// Reserve a region with no slave behind it.
    ///
    /// Used for memory owned by a processing system outside the fabric, and
    /// for linker-only regions.
    pub fn add_region(&mut self, region: Region) -> Result<(), FabricError> {
        if !region.linker {
            self.check_width(&region.name, &region.range(), self.config.address_width)?;
        }
        log::info!("Reserved region '{}' {} {}", region.name, region.range(), region.mode);
        Ok(self.regions.register(region)?)
    }

    /// Reserve a region at the first free, size-aligned spot in `search`.
    ///
    /// The search is clipped to the fabric's address space.
    pub fn allocate_region(
        &mut self,
        name: impl Into<String>,
        size: u64,
        mode: AccessMode,
        cached: bool,
        search: AddressRange,
    ) -> Result<Region, FabricError> {
        let name = name.into();
        let width = self.config.address_width;
        let top = max_address(width);
        if search.base > top {
            return Err(FabricError::AddressWidth { name, address: search.base, width });
        }
        let end = search.end().min(top.saturating_add(1));
        let clipped = AddressRange::new(search.base, end - search.base);
        Ok(self.regions.allocate(name, size, mode, cached, clipped)?)
    }

    /// Remove a region reservation.
    ///
    /// Regions fronted by a slave are removed with [`detach_slave`](Self::detach_slave).
    pub fn remove_region(&mut self, name: &str) -> Result<Region, FabricError> {
        if self.slaves.values().any(|s| s.region == name) {
            return Err(FabricError::RegionInUse(name.to_string()));
        }
        Ok(self.regions.remove(name)?)
    }

    /// Attach a master that sees the global map unchanged.
    pub fn attach_master(&mut self, port: Port) -> MasterId {
        self.insert_master(port, None)
    }

    /// Attach a master whose addresses pass through `view` before decode.
    pub fn attach_master_with_view(&mut self, port: Port, view: Translation) -> Result<MasterId, FabricError> {
        let name = port.id.to_string();
        let source = view.source_window();
        if source.size == 0 {
            return Err(RegionError::ZeroSize(name).into());
        }
        self.check_width(&name, &source, port.address_width)?;
        self.check_width(&name, &view.dest_window(), self.config.address_width)?;
        Ok(self.insert_master(port, Some(view)))
    }

    fn insert_master(&mut self, port: Port, view: Option<Translation>) -> MasterId {
        let id = MasterId(self.next_master);
        self.next_master += 1;

        let bridge = BridgeSpec::between(port.protocol, self.config.protocol, port.data_width);
        log::info!(
            "Attached {} '{}' ({}, {}-bit data){}",
            id,
            port.id,
            port.protocol,
            port.data_width,
            match (&view, &bridge) {
                (Some(v), Some(_)) => format!(" view {} via bridge", v),
                (Some(v), None) => format!(" view {}", v),
                (None, Some(_)) => " via bridge".to_string(),
                (None, None) => String::new(),
            }
        );

        self.masters.insert(id, MasterEntry { port, view, bridge });
        self.reach.insert(id, BTreeSet::new());
        id
    }

    /// Attach a slave decoding `region`.
    ///
    /// With a translation, the slave sees addresses rebased through it; the
    /// translation window must cover the whole region. A bridge is recorded
    /// when the slave's protocol differs from the fabric's.
    pub fn attach_slave(
        &mut self,
        port: Port,
        region: Region,
        translation: Option<Translation>,
    ) -> Result<SlaveId, FabricError> {
        let range = region.range();
        if region.linker {
            return Err(FabricError::LinkerRegion(region.name));
        }
        self.check_width(&region.name, &range, self.config.address_width)?;

        let local = match &translation {
            Some(t) => t.translate_range(&range).map_err(|_| FabricError::TranslationMismatch {
                region: region.name.clone(),
                window: t.source_window(),
            })?,
            None => range,
        };
        self.check_width(&region.name, &local, port.address_width)?;

        // Last fallible step: nothing has been mutated before this point.
        self.regions.register(region.clone())?;

        let id = SlaveId(self.next_slave);
        self.next_slave += 1;

        let bridge = BridgeSpec::between(self.config.protocol, port.protocol, port.data_width);
        log::info!(
            "Attached {} '{}' at {} {} ({}){}{}",
            id,
            region.name,
            range,
            region.mode,
            port.protocol,
            translation.map(|t| format!(" -> 0x{:08x}", t.dest_base())).unwrap_or_default(),
            if bridge.is_some() { " via bridge" } else { "" }
        );

        self.slaves.insert(
            id,
            SlaveEntry { port, region: region.name, translation, bridge },
        );
        Ok(id)
    }

    /// Detach a slave, releasing its region and reachability.
    pub fn detach_slave(&mut self, slave: SlaveId) -> Result<Region, FabricError> {
        let entry = self.slaves.get(&slave).ok_or(FabricError::UnknownSlave(slave))?;
        let region = self.regions.remove(&entry.region)?;
        self.slaves.remove(&slave);
        for reachable in self.reach.values_mut() {
            reachable.remove(&slave);
        }
        log::info!("Detached {} '{}'", slave, region.name);
        Ok(region)
    }

    /// Allow `master` to reach `slave`.
    pub fn connect(&mut self, master: MasterId, slave: SlaveId) -> Result<(), FabricError> {
        if !self.masters.contains_key(&master) {
            return Err(FabricError::UnknownMaster(master));
        }
        let entry = self.slaves.get(&slave).ok_or(FabricError::UnknownSlave(slave))?;
        let region = self
            .regions
            .get(&entry.region)
            .ok_or_else(|| RegionError::NotFound(entry.region.clone()))?;
        if let Some(owner) = region.owner {
            if owner != master {
                return Err(FabricError::OwnedByOtherMaster {
                    region: region.name.clone(),
                    owner,
                    master,
                });
            }
        }

        log::debug!("Connect {} -> {} '{}'", master, slave, region.name);
        self.reach.entry(master).or_default().insert(slave);
        Ok(())
    }

    /// Connect every master to every slave it may reach (shared interconnect).
    ///
    /// Slaves whose region is private to another master are skipped.
    pub fn connect_all(&mut self) {
        let pairs: Vec<(MasterId, SlaveId)> = self
            .masters
            .keys()
            .flat_map(|m| self.slaves.keys().map(move |s| (*m, *s)))
            .collect();
        for (master, slave) in pairs {
            if let Err(e) = self.connect(master, slave) {
                log::debug!("connect_all: skipping {} -> {}: {}", master, slave, e);
            }
        }
    }

    /// Freeze the configuration.
    pub fn finalize(mut self) -> Fabric {
        self.regions.freeze();

        for (id, entry) in &self.masters {
            if self.reach.get(id).map_or(true, |r| r.is_empty()) {
                log::warn!("{} '{}' cannot reach any slave", id, entry.port.id);
            }
        }

        let decoder = self
            .slaves
            .iter()
            .map(|(id, entry)| (entry.region.clone(), *id))
            .collect();

        let fabric = Fabric {
            config: self.config,
            regions: self.regions,
            masters: self.masters,
            slaves: self.slaves,
            reach: self.reach,
            decoder,
        };
        log::info!(
            "Fabric finalized: {} masters, {} slaves, {} regions",
            fabric.masters.len(),
            fabric.slaves.len(),
            fabric.regions.len()
        );
        for entry in fabric.memory_map() {
            log::info!("  {}", entry);
        }
        fabric
    }

    fn check_width(&self, name: &str, range: &AddressRange, width: u32) -> Result<(), FabricError> {
        match range.last() {
            Some(last) if last > max_address(width) => Err(FabricError::AddressWidth {
                name: name.to_string(),
                address: last,
                width,
            }),
            _ => Ok(()),
        }
    }
}

/// Finalized, immutable fabric.
#[derive(Debug, Clone)]
pub struct Fabric {
    config: FabricConfig,
    regions: RegionTable,
    masters: BTreeMap<MasterId, MasterEntry>,
    slaves: BTreeMap<SlaveId, SlaveEntry>,
    reach: BTreeMap<MasterId, BTreeSet<SlaveId>>,
    /// Region name -> slave decoding it
    decoder: BTreeMap<String, SlaveId>,
}

impl Fabric {
    pub fn config(&self) -> &FabricConfig {
        &self.config
    }

    /// The frozen region table.
    pub fn regions(&self) -> &RegionTable {
        &self.regions
    }

    /// Bus region containing a global address.
    pub fn lookup(&self, addr: u64) -> Option<&Region> {
        self.regions.lookup(addr)
    }

    /// Route an access from `master` to the slave decoding `address`.
    pub fn route(&self, master: MasterId, address: u64, access: Access) -> Result<RouteTarget, RoutingError> {
        let entry = self.masters.get(&master).ok_or(RoutingError::UnknownMaster(master))?;
        let not_mapped = || RoutingError::AddressNotMapped { master, address };

        let global = match &entry.view {
            Some(view) => view.translate(address).map_err(|_| not_mapped())?,
            None => address,
        };

        let region = self.regions.lookup(global).ok_or_else(not_mapped)?;
        let slave = *self.decoder.get(&region.name).ok_or_else(not_mapped)?;
        if !self.reach.get(&master).map_or(false, |r| r.contains(&slave)) {
            return Err(not_mapped());
        }

        if !region.mode.permits(access) {
            return Err(RoutingError::AccessDenied {
                region: region.name.clone(),
                access,
                mode: region.mode,
            });
        }

        let slave_entry = self.slaves.get(&slave).ok_or_else(not_mapped)?;
        let local = match &slave_entry.translation {
            Some(t) => t.translate(global).map_err(|_| not_mapped())?,
            None => global,
        };

        log::trace!(
            "route {} 0x{:08X} {} -> {} '{}' @0x{:08X}",
            master,
            address,
            access,
            slave,
            region.name,
            local
        );
        Ok(RouteTarget { slave, address: local })
    }

    /// Slaves reachable from a master.
    pub fn reachable(&self, master: MasterId) -> impl Iterator<Item = SlaveId> + '_ {
        self.reach.get(&master).into_iter().flat_map(|r| r.iter().copied())
    }

    pub fn masters(&self) -> impl Iterator<Item = MasterId> + '_ {
        self.masters.keys().copied()
    }

    pub fn slaves(&self) -> impl Iterator<Item = SlaveId> + '_ {
        self.slaves.keys().copied()
    }

    pub fn master_port(&self, master: MasterId) -> Option<&Port> {
        self.masters.get(&master).map(|m| &m.port)
    }

    pub fn master_view(&self, master: MasterId) -> Option<&Translation> {
        self.masters.get(&master).and_then(|m| m.view.as_ref())
    }

    /// Bridge inserted between a master and the fabric, if any.
    pub fn master_bridge(&self, master: MasterId) -> Option<BridgeSpec> {
        self.masters.get(&master).and_then(|m| m.bridge)
    }

    pub fn slave_port(&self, slave: SlaveId) -> Option<&Port> {
        self.slaves.get(&slave).map(|s| &s.port)
    }

    pub fn slave_region(&self, slave: SlaveId) -> Option<&Region> {
        self.slaves.get(&slave).and_then(|s| self.regions.get(&s.region))
    }

    pub fn slave_translation(&self, slave: SlaveId) -> Option<&Translation> {
        self.slaves.get(&slave).and_then(|s| s.translation.as_ref())
    }

    /// Bridge inserted between the fabric and a slave, if any.
    pub fn slave_bridge(&self, slave: SlaveId) -> Option<BridgeSpec> {
        self.slaves.get(&slave).and_then(|s| s.bridge)
    }

    /// Slave fronting the named region.
    pub fn slave_by_region(&self, name: &str) -> Option<SlaveId> {
        self.decoder.get(name).copied()
    }

    /// Master attached with the given port name.
    pub fn master_by_port(&self, name: &str) -> Option<MasterId> {
        self.masters
            .iter()
            .find(|(_, m)| m.port.id.as_str() == name)
            .map(|(id, _)| *id)
    }

    /// All regions, bus and linker, sorted by origin.
    pub fn memory_map(&self) -> Vec<MemoryMapEntry> {
        let mut entries: Vec<MemoryMapEntry> = self
            .regions
            .iter()
            .chain(self.regions.linker_regions().iter())
            .map(MemoryMapEntry::from)
            .collect();
        entries.sort_by(|a, b| a.origin.cmp(&b.origin).then(a.linker.cmp(&b.linker)));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fabric::bridge::BridgeKind;

    fn simple(name: &str) -> Port {
        Port::simple(name, 32, 32)
    }

    fn burst(name: &str) -> Port {
        Port::burst(name, 32, 32, 12)
    }

    #[test]
    fn test_attach_overlap_leaves_fabric_unchanged() {
        let mut b = FabricBuilder::new(FabricConfig::default());
        b.attach_slave(simple("a"), Region::new("a", 0x1000, 0x1000, AccessMode::RWX), None)
            .unwrap();

        let err = b
            .attach_slave(simple("b"), Region::new("b", 0x1800, 0x1000, AccessMode::RWX), None)
            .unwrap_err();
        assert_eq!(
            err,
            FabricError::Region(RegionError::Overlap {
                name: "b".into(),
                conflicting_name: "a".into()
            })
        );
        assert_eq!(b.regions().len(), 1);

        // Ids are not consumed by failed attaches
        let c = b
            .attach_slave(simple("c"), Region::new("c", 0x2000, 0x1000, AccessMode::RWX), None)
            .unwrap();
        assert_eq!(c.index(), 1);
    }

    #[test]
    fn test_route_through_translation() {
        let mut b = FabricBuilder::new(FabricConfig::default());
        let cpu = b.attach_master(simple("cpu"));
        let ddr = b
            .attach_slave(
                burst("ps7_s_axi_gp0"),
                Region::new("main_ram", 0x4000_0000, 0x2000_0000, AccessMode::RWX),
                Some(Translation::new(AddressRange::new(0x4000_0000, 0x2000_0000), 0x0008_0000)),
            )
            .unwrap();
        b.connect(cpu, ddr).unwrap();
        let fabric = b.finalize();

        let target = fabric.route(cpu, 0x4000_0010, Access::Read).unwrap();
        assert_eq!(target, RouteTarget { slave: ddr, address: 0x0008_0010 });
        assert_eq!(fabric.slave_bridge(ddr).unwrap().kind, BridgeKind::SimpleToBurst);
        assert!(fabric.master_bridge(cpu).is_none());
    }

    #[test]
    fn test_translation_must_cover_region() {
        let mut b = FabricBuilder::new(FabricConfig::default());
        let err = b
            .attach_slave(
                burst("gp1"),
                Region::new("ps_io", 0x8000_0000, 0x2000_0000, AccessMode::RW),
                Some(Translation::new(AddressRange::new(0x8000_0000, 0x1000_0000), 0xE000_0000)),
            )
            .unwrap_err();
        assert!(matches!(err, FabricError::TranslationMismatch { .. }));
        assert!(b.regions().is_empty());
    }

    #[test]
    fn test_address_width_checks() {
        let mut b = FabricBuilder::new(FabricConfig::default());
        let err = b
            .attach_slave(simple("hi"), Region::new("hi", 0xFFFF_F000, 0x2000, AccessMode::RW), None)
            .unwrap_err();
        assert!(matches!(err, FabricError::AddressWidth { width: 32, .. }));

        // Slave port too narrow for its translated window
        let err = b
            .attach_slave(
                Port::simple("narrow", 32, 16),
                Region::new("narrow", 0x1000_0000, 0x2_0000, AccessMode::RW),
                Some(Translation::new(AddressRange::new(0x1000_0000, 0x2_0000), 0)),
            )
            .unwrap_err();
        assert!(matches!(err, FabricError::AddressWidth { width: 16, .. }));

        b.attach_slave(
            Port::simple("ok", 32, 16),
            Region::new("ok", 0x1000_0000, 0x1_0000, AccessMode::RW),
            Some(Translation::new(AddressRange::new(0x1000_0000, 0x1_0000), 0)),
        )
        .unwrap();
    }

    #[test]
    fn test_unknown_ids() {
        let mut b = FabricBuilder::new(FabricConfig::default());
        let cpu = b.attach_master(simple("cpu"));
        let ram = b
            .attach_slave(simple("ram"), Region::new("ram", 0x0, 0x1000, AccessMode::RWX), None)
            .unwrap();

        assert_eq!(b.connect(MasterId(9), ram), Err(FabricError::UnknownMaster(MasterId(9))));
        assert_eq!(b.connect(cpu, SlaveId(9)), Err(FabricError::UnknownSlave(SlaveId(9))));

        let fabric = b.finalize();
        assert_eq!(
            fabric.route(MasterId(9), 0x0, Access::Read),
            Err(RoutingError::UnknownMaster(MasterId(9)))
        );
    }

    #[test]
    fn test_access_mode_enforced() {
        let mut b = FabricBuilder::new(FabricConfig::default());
        let cpu = b.attach_master(simple("cpu"));
        let rom = b
            .attach_slave(simple("rom"), Region::new("rom", 0x0, 0x1000, AccessMode::R), None)
            .unwrap();
        b.connect(cpu, rom).unwrap();
        let fabric = b.finalize();

        assert!(fabric.route(cpu, 0x10, Access::Read).is_ok());
        let err = fabric.route(cpu, 0x10, Access::Write).unwrap_err();
        assert_eq!(
            err,
            RoutingError::AccessDenied { region: "rom".into(), access: Access::Write, mode: AccessMode::R }
        );
        assert!(matches!(
            fabric.route(cpu, 0x10, Access::Execute),
            Err(RoutingError::AccessDenied { .. })
        ));
    }

    #[test]
    fn test_unreachable_and_unmapped() {
        let mut b = FabricBuilder::new(FabricConfig::default());
        let cpu = b.attach_master(simple("cpu"));
        let dma = b.attach_master(simple("dma"));
        let ram = b
            .attach_slave(simple("ram"), Region::new("ram", 0x0, 0x1000, AccessMode::RWX), None)
            .unwrap();
        b.add_region(Region::new("ps_ddr", 0x1000_0000, 0x1000, AccessMode::RWX)).unwrap();
        b.connect(cpu, ram).unwrap();
        let fabric = b.finalize();

        // Not connected
        assert_eq!(
            fabric.route(dma, 0x0, Access::Read),
            Err(RoutingError::AddressNotMapped { master: dma, address: 0x0 })
        );
        // Hole in the map
        assert!(matches!(
            fabric.route(cpu, 0x2000, Access::Read),
            Err(RoutingError::AddressNotMapped { .. })
        ));
        // Reserved region with no slave
        assert!(matches!(
            fabric.route(cpu, 0x1000_0000, Access::Read),
            Err(RoutingError::AddressNotMapped { .. })
        ));
    }

    #[test]
    fn test_route_is_deterministic() {
        let mut b = FabricBuilder::new(FabricConfig::default());
        let cpu = b.attach_master(simple("cpu"));
        b.attach_slave(simple("ram"), Region::new("ram", 0x0, 0x1000, AccessMode::RWX), None)
            .unwrap();
        b.connect_all();
        let fabric = b.finalize();

        let first = fabric.route(cpu, 0x123, Access::Write);
        for _ in 0..16 {
            assert_eq!(fabric.route(cpu, 0x123, Access::Write), first);
        }
        let miss = fabric.route(cpu, 0x5000, Access::Read);
        assert_eq!(fabric.route(cpu, 0x5000, Access::Read), miss);
    }

    #[test]
    fn test_master_view() {
        let mut b = FabricBuilder::new(FabricConfig::default());
        let gp0 = b
            .attach_master_with_view(
                burst("ps7_m_axi_gp0"),
                Translation::identity(AddressRange::new(0x4000_0000, 0x4000_0000)),
            )
            .unwrap();
        let dma = b
            .attach_master_with_view(
                simple("dma"),
                Translation::new(AddressRange::new(0x0, 0x1_0000), 0x1000_0000),
            )
            .unwrap();
        let csr = b
            .attach_slave(simple("csr"), Region::new("csr", 0x4000_0000, 0x1_0000, AccessMode::RW), None)
            .unwrap();
        let sram = b
            .attach_slave(simple("sram"), Region::new("sram", 0x1000_0000, 0x1_0000, AccessMode::RWX), None)
            .unwrap();
        b.connect_all();
        let fabric = b.finalize();

        assert_eq!(fabric.route(gp0, 0x4000_0004, Access::Read).unwrap().slave, csr);
        // Outside the GP0 aperture
        assert!(fabric.route(gp0, 0x1000_0000, Access::Read).is_err());
        // DMA sees SRAM at 0
        let t = fabric.route(dma, 0x20, Access::Write).unwrap();
        assert_eq!(t, RouteTarget { slave: sram, address: 0x1000_0020 });

        assert_eq!(fabric.master_bridge(gp0).unwrap().kind, BridgeKind::BurstToSimple);
        assert_eq!(fabric.master_by_port("dma"), Some(dma));
    }

    #[test]
    fn test_region_ownership() {
        let mut b = FabricBuilder::new(FabricConfig::default());
        let cpu = b.attach_master(simple("cpu"));
        let dma = b.attach_master(simple("dma"));
        let scratch = b
            .attach_slave(
                simple("scratch"),
                Region::new("scratch", 0x2000, 0x100, AccessMode::RW).owned_by(dma),
                None,
            )
            .unwrap();

        assert_eq!(
            b.connect(cpu, scratch),
            Err(FabricError::OwnedByOtherMaster { region: "scratch".into(), owner: dma, master: cpu })
        );
        b.connect(dma, scratch).unwrap();

        b.connect_all();
        let fabric = b.finalize();
        assert_eq!(fabric.reachable(cpu).count(), 0);
        assert_eq!(fabric.reachable(dma).collect::<Vec<_>>(), vec![scratch]);
    }

    #[test]
    fn test_allocate_within_address_width() {
        let mut b = FabricBuilder::new(FabricConfig::default());

        // Search entirely above the 32-bit space
        let err = b
            .allocate_region("hi", 0x1000, AccessMode::RW, true, AddressRange::new(0x1_0000_0000, 0x1_0000))
            .unwrap_err();
        assert!(matches!(err, FabricError::AddressWidth { width: 32, address: 0x1_0000_0000, .. }));
        assert!(b.regions().is_empty());

        // Search straddling the top: only the part below 4 GiB is used
        b.add_region(Region::new("low", 0xFFFF_E000, 0x1000, AccessMode::RW)).unwrap();
        let region = b
            .allocate_region("top", 0x1000, AccessMode::RW, true, AddressRange::new(0xFFFF_E000, 0x1_0000))
            .unwrap();
        assert_eq!(region.origin, 0xFFFF_F000);

        let err = b
            .allocate_region("more", 0x1000, AccessMode::RW, true, AddressRange::new(0xFFFF_E000, 0x1_0000))
            .unwrap_err();
        assert!(matches!(err, FabricError::Region(RegionError::NoSpace { .. })));
    }

    #[test]
    fn test_remove_and_detach() {
        let mut b = FabricBuilder::new(FabricConfig::default());
        let cpu = b.attach_master(simple("cpu"));
        let ram = b
            .attach_slave(simple("ram"), Region::new("ram", 0x0, 0x1000, AccessMode::RWX), None)
            .unwrap();
        b.add_region(Region::new("hole", 0x8000, 0x1000, AccessMode::RW)).unwrap();
        b.connect(cpu, ram).unwrap();

        assert_eq!(b.remove_region("ram"), Err(FabricError::RegionInUse("ram".into())));
        b.remove_region("hole").unwrap();

        let region = b.detach_slave(ram).unwrap();
        assert_eq!(region.name, "ram");
        assert!(b.regions().is_empty());
        assert_eq!(b.detach_slave(ram), Err(FabricError::UnknownSlave(ram)));

        let fabric = b.finalize();
        assert_eq!(fabric.reachable(cpu).count(), 0);
        assert!(fabric.regions().is_frozen());
    }

    #[test]
    fn test_memory_map_sorted_with_linker() {
        let mut b = FabricBuilder::new(FabricConfig::default());
        b.add_region(Region::new("flash", 0xFC00_0000, 0x4_0000, AccessMode::RWX)).unwrap();
        b.add_region(Region::new("rom", 0xFC00_0000, 0x200_0000, AccessMode::RWX).linker())
            .unwrap();
        b.add_region(Region::new("sram", 0x0010_0000, 0x1000, AccessMode::RWX)).unwrap();
        let fabric = b.finalize();

        let names: Vec<String> = fabric.memory_map().into_iter().map(|e| e.name).collect();
        assert_eq!(names, ["sram", "flash", "rom"]);
    }

    #[test]
    fn test_io_window_via_builder() {
        let mut b = FabricBuilder::new(FabricConfig::default());
        b.add_io_window(AddressRange::new(0x8000_0000, 0x8000_0000)).unwrap();
        b.attach_slave(
            burst("gp1"),
            Region::new("ps_io", 0x8000_0000, 0x2000_0000, AccessMode::RW).uncached(),
            None,
        )
        .unwrap();
        let err = b
            .attach_slave(simple("x"), Region::new("x", 0x1000, 0x10, AccessMode::RW).uncached(), None)
            .unwrap_err();
        assert!(matches!(err, FabricError::Region(RegionError::NotInIoWindow { .. })));
    }

    #[test]
    fn test_fabric_shared_across_threads() {
        let mut b = FabricBuilder::new(FabricConfig::default());
        let cpu = b.attach_master(simple("cpu"));
        b.attach_slave(simple("ram"), Region::new("ram", 0x0, 0x1000, AccessMode::RWX), None)
            .unwrap();
        b.connect_all();
        let fabric = std::sync::Arc::new(b.finalize());

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let fabric = fabric.clone();
                std::thread::spawn(move || fabric.route(cpu, i * 4, Access::Read).unwrap().address)
            })
            .collect();
        let addrs: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(addrs, vec![0, 4, 8, 12]);
    }
}
