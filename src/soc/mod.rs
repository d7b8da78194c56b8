//! SoC assembly for the Digilent Zybo Z7.
//!
//! Two CPU arrangements are supported:
//!
//! - **Zynq7000**: the hard ARM cores of the processing system (PS) drive the
//!   fabric through the PS `M_AXI_GP0` port. DDR and boot memory belong to the
//!   PS and are only reserved in the map.
//! - **Soft**: a soft CPU in the programmable logic owns the fabric. With
//!   `with_ps7` (Z7-20 only) the PS is attached as a slave: its DDR and IO
//!   spaces appear through two burst-bus slave ports, rebased into the PS
//!   address map, and the PS UART interrupt is aggregated into CSR space.
//!
//! ```text
//!  Soft CPU + PS7                          PS address map
//!  0x0000_0000 rom                ┌──────►  0x0008_0000 DDR
//!  0x1000_0000 sram               │
//!  0x4000_0000 main_ram ──S_GP0───┘  ┌──►  0xE000_0000 IO peripherals
//!  0x8000_0000 ps_io    ──S_GP1──────┘
//!  0xF000_0000 csr
//! ```

pub mod header;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::fabric::{
    AccessMode, AddressRange, Fabric, FabricBuilder, FabricConfig, FabricError, MasterId, Port,
    Region, SlaveId, Translation,
};
use crate::irq::{EventKind, EventManager, InterruptMap, IrqError, RegisterLayout};

/// Data width of every fabric port on this board.
pub const DATA_WIDTH: u32 = 32;
/// Address width of the fabric.
pub const ADDRESS_WIDTH: u32 = 32;
/// Transaction tag width of the PS master GP ports.
pub const PS7_M_GP_ID_WIDTH: u32 = 12;
/// Transaction tag width of the PS slave GP ports.
pub const PS7_S_GP_ID_WIDTH: u32 = 6;

/// Size of one CSR page.
pub const CSR_PAGE_SIZE: u64 = 0x800;
/// Size of the CSR window.
pub const CSR_SIZE: u64 = 0x1_0000;
/// Address width of the CSR bank port.
pub const CSR_ADDRESS_WIDTH: u32 = 16;
/// Spacing of CSR registers.
pub const CSR_STRIDE: u64 = 4;

/// Clock frequency of the PS CPU, published when it runs the software.
pub const PS7_CPU_CLOCK_FREQUENCY: u64 = 666_666_687;
/// CPU interrupt line of the PS interrupt aggregator.
pub const PS_INTERRUPT_LINE: u32 = 2;
/// Number of CPU interrupt inputs.
pub const CPU_INTERRUPT_LINES: u32 = 32;

/// Zynq-7000 as CPU: CSR base seen through GP0.
pub const ZYNQ_CSR_BASE: u64 = 0x4000_0000;
/// Zynq-7000 as CPU: aperture of the GP0 master port.
pub const ZYNQ_GP0_WINDOW: AddressRange = AddressRange::new(0x4000_0000, 0x4000_0000);
/// Zynq-7000 as CPU: uncached window.
pub const ZYNQ_IO_WINDOW: AddressRange = AddressRange::new(0x4000_0000, 0xBC00_0000);
/// Zynq-7000 as CPU: OCM/DDR start used for software.
pub const ZYNQ_SRAM_BASE: u64 = 0x0010_0000;
/// Zynq-7000 as CPU: DDR fitted on the board.
pub const ZYNQ_DDR_SIZE: u64 = 512 * 1024 * 1024;
/// Zynq-7000 as CPU: boot ROM image (linker only).
pub const ZYNQ_ROM: AddressRange = AddressRange::new(0xFC00_0000, 256 * 1024 * 1024 / 8);
/// Zynq-7000 as CPU: QSPI flash window.
pub const ZYNQ_FLASH: AddressRange = AddressRange::new(0xFC00_0000, 0x4_0000);

/// Soft CPU: uncached window.
pub const SOFT_IO_WINDOW: AddressRange = AddressRange::new(0x8000_0000, 0x8000_0000);
pub const SOFT_ROM: AddressRange = AddressRange::new(0x0000_0000, 0x2_0000);
pub const SOFT_SRAM: AddressRange = AddressRange::new(0x1000_0000, 0x2000);
pub const SOFT_CSR_BASE: u64 = 0xF000_0000;

/// Default offset of the PS DDR window in the soft CPU map.
pub const PS7_DDR_SLAVE_BASE: u64 = 0x4000_0000;
/// Default PS-side address of that window.
pub const PS7_DDR_DEST_BASE: u64 = 0x0008_0000;
/// Default offset of the PS IO window in the soft CPU map.
pub const PS7_IO_SLAVE_BASE: u64 = 0x8000_0000;
/// Default PS-side address of that window.
pub const PS7_IO_DEST_BASE: u64 = 0xE000_0000;
/// Size of each PS slave window.
pub const PS7_SLAVE_WINDOW_SIZE: u64 = 0x2000_0000;

/// Error type for SoC assembly.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SocError {
    #[error(transparent)]
    Fabric(#[from] FabricError),

    #[error(transparent)]
    Irq(#[from] IrqError),

    #[error("unsupported configuration: {0}")]
    Unsupported(String),

    #[error("unknown board variant '{0}' (expected z7-10 or z7-20)")]
    UnknownVariant(String),

    #[error("unknown CPU type '{0}' (expected vexriscv or zynq7000)")]
    UnknownCpu(String),
}

/// Zybo Z7 board variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoardVariant {
    /// XC7Z010
    #[default]
    Z7_10,
    /// XC7Z020
    Z7_20,
}

impl FromStr for BoardVariant {
    type Err = SocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "z7-10" | "z7_10" => Ok(BoardVariant::Z7_10),
            "z7-20" | "z7_20" => Ok(BoardVariant::Z7_20),
            _ => Err(SocError::UnknownVariant(s.to_string())),
        }
    }
}

impl fmt::Display for BoardVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoardVariant::Z7_10 => write!(f, "z7-10"),
            BoardVariant::Z7_20 => write!(f, "z7-20"),
        }
    }
}

/// CPU driving the fabric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CpuKind {
    /// Soft CPU in the programmable logic
    #[default]
    Soft,
    /// Hard ARM cores of the PS, through GP0
    Zynq7000,
}

impl FromStr for CpuKind {
    type Err = SocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vexriscv" | "soft" => Ok(CpuKind::Soft),
            "zynq7000" => Ok(CpuKind::Zynq7000),
            _ => Err(SocError::UnknownCpu(s.to_string())),
        }
    }
}

impl fmt::Display for CpuKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CpuKind::Soft => write!(f, "vexriscv"),
            CpuKind::Zynq7000 => write!(f, "zynq7000"),
        }
    }
}

/// Placement of the PS slave windows in the soft CPU map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ps7SlaveMap {
    pub ddr_base: u64,
    pub ddr_dest: u64,
    pub io_base: u64,
    pub io_dest: u64,
    pub window_size: u64,
}

impl Default for Ps7SlaveMap {
    fn default() -> Self {
        Self {
            ddr_base: PS7_DDR_SLAVE_BASE,
            ddr_dest: PS7_DDR_DEST_BASE,
            io_base: PS7_IO_SLAVE_BASE,
            io_dest: PS7_IO_DEST_BASE,
            window_size: PS7_SLAVE_WINDOW_SIZE,
        }
    }
}

impl Ps7SlaveMap {
    pub fn ddr_translation(&self) -> Translation {
        Translation::new(AddressRange::new(self.ddr_base, self.window_size), self.ddr_dest)
    }

    pub fn io_translation(&self) -> Translation {
        Translation::new(AddressRange::new(self.io_base, self.window_size), self.io_dest)
    }
}

/// Board parameters, resolved once before assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocConfig {
    pub variant: BoardVariant,
    pub cpu: CpuKind,
    /// Attach the PS as a slave of a soft CPU
    pub with_ps7: bool,
    /// System clock in Hz
    pub sys_clk_freq: u64,
    pub ps7: Ps7SlaveMap,
}

impl Default for SocConfig {
    fn default() -> Self {
        Self {
            variant: BoardVariant::default(),
            cpu: CpuKind::default(),
            with_ps7: false,
            sys_clk_freq: 125_000_000,
            ps7: Ps7SlaveMap::default(),
        }
    }
}

/// A value in the generated constants header.
pub type Constant = (String, Option<String>);

/// An assembled SoC: frozen fabric, interrupt aggregators and constants.
#[derive(Debug, Clone)]
pub struct Soc {
    config: SocConfig,
    fabric: Fabric,
    cpu: MasterId,
    ps_gp0: Option<MasterId>,
    csr: SlaveId,
    events: Vec<EventManager>,
    interrupts: InterruptMap,
    constants: Vec<Constant>,
}

/// State carried through assembly.
struct Assembly {
    builder: FabricBuilder,
    csr_base: u64,
    next_csr_page: u64,
    events: Vec<EventManager>,
    interrupts: InterruptMap,
    constants: Vec<Constant>,
}

impl Assembly {
    fn new(csr_base: u64) -> Self {
        let config = FabricConfig {
            data_width: DATA_WIDTH,
            address_width: ADDRESS_WIDTH,
            ..FabricConfig::default()
        };
        Self {
            builder: FabricBuilder::new(config),
            csr_base,
            next_csr_page: 0,
            events: Vec::new(),
            interrupts: InterruptMap::new(CPU_INTERRUPT_LINES),
            constants: Vec::new(),
        }
    }

    fn constant(&mut self, name: &str, value: Option<String>) {
        self.constants.retain(|(n, _)| n != name);
        self.constants.push((name.to_string(), value));
    }

    fn attach_csr(&mut self) -> Result<SlaveId, SocError> {
        let region = Region::new("csr", self.csr_base, CSR_SIZE, AccessMode::RW).uncached();
        let bus_to_csr = Translation::new(AddressRange::new(self.csr_base, CSR_SIZE), 0);
        Ok(self
            .builder
            .attach_slave(Port::simple("csr", DATA_WIDTH, CSR_ADDRESS_WIDTH), region, Some(bus_to_csr))?)
    }

    /// New aggregator on the next free CSR page.
    fn event_manager(&mut self, name: &str) -> Result<EventManager, SocError> {
        let base = self.csr_base + self.next_csr_page * CSR_PAGE_SIZE;
        if (self.next_csr_page + 1) * CSR_PAGE_SIZE > CSR_SIZE {
            return Err(SocError::Unsupported(format!("no CSR page left for '{}'", name)));
        }
        self.next_csr_page += 1;
        Ok(EventManager::new(name, RegisterLayout::new(base, CSR_STRIDE))?)
    }
}

impl Soc {
    /// Assemble the SoC described by `config`.
    pub fn build(config: &SocConfig) -> Result<Soc, SocError> {
        log::info!(
            "Building Zybo {} SoC: cpu={} with_ps7={} sys_clk={} Hz",
            config.variant,
            config.cpu,
            config.with_ps7,
            config.sys_clk_freq
        );
        let (mut asm, cpu, ps_gp0, csr) = match config.cpu {
            CpuKind::Zynq7000 => Self::build_zynq(config)?,
            CpuKind::Soft => Self::build_soft(config)?,
        };
        if config.with_ps7 {
            asm.constant("UART_PS", None);
        }

        asm.builder.connect_all();
        let fabric = asm.builder.finalize();

        Ok(Soc {
            config: *config,
            fabric,
            cpu,
            ps_gp0,
            csr,
            events: asm.events,
            interrupts: asm.interrupts,
            constants: asm.constants,
        })
    }

    /// PS cores as CPU: the fabric is driven from GP0.
    fn build_zynq(config: &SocConfig) -> Result<(Assembly, MasterId, Option<MasterId>, SlaveId), SocError> {
        let mut asm = Assembly::new(ZYNQ_CSR_BASE);
        match config.variant {
            BoardVariant::Z7_10 => log::info!("PS7 configured from a pre-generated XCI"),
            BoardVariant::Z7_20 => log::info!("PS7 configured from the board preset"),
        }

        asm.builder.add_io_window(ZYNQ_IO_WINDOW)?;
        let gp0 = asm.builder.attach_master_with_view(
            Port::burst("ps7_m_axi_gp0", DATA_WIDTH, ADDRESS_WIDTH, PS7_M_GP_ID_WIDTH),
            Translation::identity(ZYNQ_GP0_WINDOW),
        )?;

        // TODO: size sram from the variant once the Z7-10 DDR size is confirmed
        asm.builder.add_region(Region::new(
            "sram",
            ZYNQ_SRAM_BASE,
            ZYNQ_DDR_SIZE - ZYNQ_SRAM_BASE,
            AccessMode::RWX,
        ))?;
        asm.builder
            .add_region(Region::new("rom", ZYNQ_ROM.base, ZYNQ_ROM.size, AccessMode::RWX).linker())?;
        asm.builder
            .add_region(Region::new("flash", ZYNQ_FLASH.base, ZYNQ_FLASH.size, AccessMode::RWX))?;

        let csr = asm.attach_csr()?;
        asm.constant("CONFIG_CLOCK_FREQUENCY", Some(PS7_CPU_CLOCK_FREQUENCY.to_string()));
        Ok((asm, gp0, Some(gp0), csr))
    }

    /// Soft CPU, optionally with the PS attached as a slave.
    fn build_soft(config: &SocConfig) -> Result<(Assembly, MasterId, Option<MasterId>, SlaveId), SocError> {
        let mut asm = Assembly::new(SOFT_CSR_BASE);
        asm.builder.add_io_window(SOFT_IO_WINDOW)?;
        let cpu = asm
            .builder
            .attach_master(Port::simple("cpu", DATA_WIDTH, ADDRESS_WIDTH));

        asm.builder.attach_slave(
            Port::simple("rom", DATA_WIDTH, ADDRESS_WIDTH),
            Region::new("rom", SOFT_ROM.base, SOFT_ROM.size, AccessMode::RX),
            None,
        )?;
        asm.builder.attach_slave(
            Port::simple("sram", DATA_WIDTH, ADDRESS_WIDTH),
            Region::new("sram", SOFT_SRAM.base, SOFT_SRAM.size, AccessMode::RWX),
            None,
        )?;
        let csr = asm.attach_csr()?;
        asm.constant("CONFIG_CLOCK_FREQUENCY", Some(config.sys_clk_freq.to_string()));

        let mut ps_gp0 = None;
        if config.with_ps7 {
            if config.variant != BoardVariant::Z7_20 {
                return Err(SocError::Unsupported(format!(
                    "PS7 as slave is not available on {}",
                    config.variant
                )));
            }
            ps_gp0 = Some(Self::attach_ps7_slave(&mut asm, &config.ps7)?);
        } else {
            let mut uart = asm.event_manager("uart")?;
            uart.declare("tx", EventKind::Pulse)?;
            uart.declare("rx", EventKind::Pulse)?;
            asm.interrupts.add("uart", None)?;
            asm.events.push(uart);
        }

        Ok((asm, cpu, ps_gp0, csr))
    }

    fn attach_ps7_slave(asm: &mut Assembly, map: &Ps7SlaveMap) -> Result<MasterId, SocError> {
        let gp0 = asm.builder.attach_master(Port::burst(
            "ps7_m_axi_gp0",
            DATA_WIDTH,
            ADDRESS_WIDTH,
            PS7_M_GP_ID_WIDTH,
        ));

        asm.builder.attach_slave(
            Port::burst("ps7_s_axi_gp0", DATA_WIDTH, ADDRESS_WIDTH, PS7_S_GP_ID_WIDTH),
            Region::new("main_ram", map.ddr_base, map.window_size, AccessMode::RWX),
            Some(map.ddr_translation()),
        )?;
        asm.builder.attach_slave(
            Port::burst("ps7_s_axi_gp1", DATA_WIDTH, ADDRESS_WIDTH, PS7_S_GP_ID_WIDTH),
            Region::new("ps_io", map.io_base, map.window_size, AccessMode::RW).uncached(),
            Some(map.io_translation()),
        )?;

        let mut ps = asm.event_manager("ps")?;
        ps.declare("uart", EventKind::Level)?;
        asm.interrupts.add("ps", Some(PS_INTERRUPT_LINE))?;
        asm.events.push(ps);
        Ok(gp0)
    }

    pub fn config(&self) -> &SocConfig {
        &self.config
    }

    pub fn fabric(&self) -> &Fabric {
        &self.fabric
    }

    /// Master the software runs on.
    pub fn cpu(&self) -> MasterId {
        self.cpu
    }

    /// PS GP0 master port, when the PS is present.
    pub fn ps_gp0(&self) -> Option<MasterId> {
        self.ps_gp0
    }

    pub fn csr(&self) -> SlaveId {
        self.csr
    }

    pub fn events(&self) -> &[EventManager] {
        &self.events
    }

    pub fn event_manager(&self, name: &str) -> Option<&EventManager> {
        self.events.iter().find(|e| e.name() == name)
    }

    pub fn event_manager_mut(&mut self, name: &str) -> Option<&mut EventManager> {
        self.events.iter_mut().find(|e| e.name() == name)
    }

    pub fn interrupts(&self) -> &InterruptMap {
        &self.interrupts
    }

    /// Constants for the generated software headers, in insertion order.
    pub fn constants(&self) -> &[Constant] {
        &self.constants
    }

    /// Current CPU interrupt vector.
    pub fn pending_interrupts(&self) -> Result<u32, SocError> {
        let managers: Vec<(&str, &EventManager)> =
            self.events.iter().map(|e| (e.name(), e)).collect();
        Ok(self.interrupts.pending_lines(&managers)?)
    }
}
