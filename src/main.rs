//! soc-fabric: assemble a Zybo Z7 SoC and print its memory map and headers

use std::env;

use anyhow::Context;
use soc_fabric::config::Config;
use soc_fabric::soc::header::{render_csr_header, render_mem_header, render_soc_header};
use soc_fabric::soc::Soc;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--sample-config") {
        print!("{}", Config::sample_config());
        return Ok(());
    }

    let config = Config::get();
    let soc_config = config.resolve().context("Failed to resolve configuration")?;
    let soc = Soc::build(&soc_config).context("Failed to assemble SoC")?;

    let headers_only = args.iter().any(|a| a == "--headers");
    if !headers_only {
        print_summary(&soc);
        println!();
    }

    println!("/* mem.h */");
    print!("{}", render_mem_header(soc.fabric()));
    println!();
    println!("/* soc.h */");
    print!("{}", render_soc_header(soc.constants()));
    if !soc.events().is_empty() {
        println!();
        println!("/* csr.h */");
        print!("{}", render_csr_header(soc.events(), soc.interrupts()));
    }

    Ok(())
}

fn print_summary(soc: &Soc) {
    let config = soc.config();
    let fabric = soc.fabric();

    println!("Zybo {} SoC ({})", config.variant, config.cpu);
    println!("=====================");
    println!("Memory map:");
    for entry in fabric.memory_map() {
        println!("  {}", entry);
    }

    println!();
    println!("Masters:");
    for master in fabric.masters() {
        if let Some(port) = fabric.master_port(master) {
            let reach: Vec<String> = fabric
                .reachable(master)
                .filter_map(|s| fabric.slave_region(s).map(|r| r.name.clone()))
                .collect();
            println!(
                "  {} {:<16} {:<10} -> {}{}",
                master,
                port.id,
                port.protocol,
                reach.join(", "),
                if fabric.master_bridge(master).is_some() { " (bridged)" } else { "" }
            );
        }
    }

    if soc.interrupts().iter().next().is_some() {
        println!();
        println!("Interrupts:");
        for (name, line) in soc.interrupts().iter() {
            println!("  {:>2} {}", line, name);
        }
    }
}
