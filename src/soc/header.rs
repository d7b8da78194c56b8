//! C header generation for software running on the SoC.
//!
//! Three headers are produced from a finalized SoC:
//! - `mem.h`: `NAME_BASE` / `NAME_SIZE` per region
//! - `soc.h`: board constants (`CONFIG_CLOCK_FREQUENCY`, feature flags)
//! - `csr.h`: event register addresses and interrupt lines

use crate::fabric::Fabric;
use crate::irq::{EventManager, InterruptMap};

use super::Constant;

fn open_guard(guard: &str) -> String {
    format!("#ifndef {guard}\n#define {guard}\n\n")
}

fn close_guard(out: &mut String) {
    out.push_str("\n#endif\n");
}

/// Render the memory map header.
pub fn render_mem_header(fabric: &Fabric) -> String {
    let mut out = open_guard("__GENERATED_MEM_H");
    for entry in fabric.memory_map() {
        let name = entry.name.to_uppercase();
        out.push_str(&format!("#ifndef {}_BASE\n", name));
        out.push_str(&format!("#define {}_BASE 0x{:08x}L\n", name, entry.origin));
        out.push_str(&format!("#define {}_SIZE 0x{:08x}\n", name, entry.size));
        out.push_str("#endif\n\n");
    }
    close_guard(&mut out);
    out
}

/// Render the board constants header.
pub fn render_soc_header(constants: &[Constant]) -> String {
    let mut out = open_guard("__GENERATED_SOC_H");
    for (name, value) in constants {
        match value {
            Some(value) => out.push_str(&format!("#define {} {}\n", name, value)),
            None => out.push_str(&format!("#define {}\n", name)),
        }
    }
    close_guard(&mut out);
    out
}

/// Render event register addresses and interrupt assignments.
pub fn render_csr_header(events: &[EventManager], interrupts: &InterruptMap) -> String {
    let mut out = open_guard("__GENERATED_CSR_H");
    for ev in events {
        let prefix = format!("CSR_{}_EV", ev.name().to_uppercase());
        let layout = ev.layout();
        out.push_str(&format!("#define {}_STATUS_ADDR 0x{:08x}L\n", prefix, layout.status_addr()));
        out.push_str(&format!("#define {}_PENDING_ADDR 0x{:08x}L\n", prefix, layout.pending_addr()));
        out.push_str(&format!("#define {}_ENABLE_ADDR 0x{:08x}L\n", prefix, layout.enable_addr()));
        for (id, source) in ev.sources() {
            out.push_str(&format!(
                "#define {}_{}_OFFSET {}\n",
                prefix,
                source.name.to_uppercase(),
                id.index()
            ));
        }
        out.push('\n');
    }
    for (name, line) in interrupts.iter() {
        out.push_str(&format!("#define {}_INTERRUPT {}\n", name.to_uppercase(), line));
    }
    close_guard(&mut out);
    out
}
