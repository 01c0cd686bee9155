//! CLI Handling module

use std::{collections::BTreeMap, fmt::Write, path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    Interface, MacLookupResult, SwitchTrace, TdrResult,
    config::Inventory,
    mac_resolution::{MacTrace, TraceOutcome},
    ssh::SshConnector,
};

/// switchtrace - find where a MAC address is plugged in and test the cable
#[derive(Parser)]
#[command(name = "switchtrace")]
#[command(about = "Trace MAC addresses to access switch ports and run cable diagnostics")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Enable debug logging (shows SSH traffic and parsing details)
    #[arg(short, long, global = true)]
    debug: bool,

    /// Path to the inventory file
    #[arg(
        short = 'c',
        long = "config",
        default_value = "inventory.yaml",
        env = "SWITCHTRACE_INVENTORY",
        global = true
    )]
    config_path: PathBuf,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the sites and switches in the inventory
    Sites,
    /// Show interface status of an access switch, with any cached cable test results
    Interfaces { site: String, switch: String },
    /// Run cable diagnostics on interfaces of an access switch
    Tdr {
        site: String,
        switch: String,
        /// Interfaces to test, e.g. Gi1/0/1 Gi1/0/2
        #[arg(required = true)]
        interfaces: Vec<String>,
    },
    /// Trace a MAC address from the site's central switch to its access switch
    FindMac { site: String, mac: String },
    /// Look a MAC address up on one access switch
    FindMacOnSwitch {
        site: String,
        switch: String,
        mac: String,
    },
}

pub async fn main_func() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let cli = Cli::parse();

    let env_filter_str = if cli.debug { "debug" } else { "info" };

    let env_filter = EnvFilter::new(format!(
        "{env_filter_str},russh::client=info,russh::sshbuffer=info"
    ));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(cli.debug)
                .with_thread_ids(false)
                .with_writer(std::io::stderr)
                .with_level(true),
        )
        .with(env_filter)
        .init();

    let inventory = match Inventory::load_from_file(&cli.config_path) {
        Ok(inventory) => {
            info!(
                "Loaded inventory with {} site(s) from {}",
                inventory.sites.len(),
                cli.config_path.display()
            );
            Arc::new(inventory)
        }
        Err(e) => {
            error!(
                "Error loading inventory '{}': {}",
                cli.config_path.display(),
                e
            );
            return Err(format!("Inventory cannot be loaded: {}", e).into());
        }
    };

    let settings = inventory.settings.clone();
    let app = SwitchTrace::new(inventory, &settings, SshConnector);

    let output = match cli.command {
        Commands::Sites => render(cli.json, app.inventory(), render_sites)?,
        Commands::Interfaces { site, switch } => {
            let (_, device) = app.access_switch(&site, &switch)?;
            let device = device.clone();
            let interfaces = app.list_interfaces(&device).await?;
            let names: Vec<String> = interfaces.iter().map(|i| i.name.clone()).collect();
            let listing = InterfaceListing {
                cached_tdr: app.cached_tdr_results(&device, &names),
                interfaces,
            };
            render(cli.json, &listing, render_interfaces)?
        }
        Commands::Tdr {
            site,
            switch,
            interfaces,
        } => {
            let (_, device) = app.access_switch(&site, &switch)?;
            let device = device.clone();
            let results = app.run_tdr(&device, &interfaces).await;
            render(cli.json, &results, render_tdr)?
        }
        Commands::FindMac { site, mac } => {
            let trace = app.find_mac_on_site(&site, &mac).await?;
            render(cli.json, &trace, render_trace)?
        }
        Commands::FindMacOnSwitch { site, switch, mac } => {
            let result = app.find_mac_on_switch(&site, &switch, &mac).await?;
            render(cli.json, &result, render_lookup)?
        }
    };

    println!("{output}");
    Ok(())
}

#[derive(Serialize)]
struct InterfaceListing {
    interfaces: Vec<Interface>,
    cached_tdr: BTreeMap<String, TdrResult>,
}

fn render<T: Serialize + ?Sized>(
    json: bool,
    value: &T,
    text: fn(&T) -> String,
) -> Result<String, serde_json::Error> {
    if json {
        serde_json::to_string_pretty(value)
    } else {
        Ok(text(value))
    }
}

fn render_sites(inventory: &Inventory) -> String {
    let mut out = String::new();
    for site in &inventory.sites {
        let _ = writeln!(out, "{}  {}", site.name, site.description);
        let _ = writeln!(
            out,
            "  central: {}",
            site.central_switch.display_name()
        );
        for switch in &site.access_switches {
            let _ = writeln!(
                out,
                "  access:  {} ({})",
                switch.display_name(),
                switch.host().unwrap_or_default()
            );
        }
    }
    out
}

fn render_interfaces(listing: &InterfaceListing) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<12} {:<24} {:<13} {:<6} {}",
        "Port", "Description", "Status", "Vlan", "Type"
    );
    for interface in &listing.interfaces {
        let _ = writeln!(
            out,
            "{:<12} {:<24} {:<13} {:<6} {}",
            interface.name,
            interface.description,
            interface.status,
            interface.vlan.as_deref().unwrap_or("-"),
            interface.media_type
        );
    }
    if !listing.cached_tdr.is_empty() {
        let _ = writeln!(out, "\nEarlier cable tests:");
        out.push_str(&render_tdr(&listing.cached_tdr));
    }
    out
}

fn render_tdr(results: &BTreeMap<String, TdrResult>) -> String {
    let mut out = String::new();
    for (interface, result) in results {
        match result {
            TdrResult::Parsed { pairs, .. } => {
                let _ = writeln!(out, "{interface}:");
                for pair in pairs {
                    let _ = writeln!(
                        out,
                        "  Pair {}  {:<11} {}",
                        pair.pair,
                        pair.status,
                        pair.length_m
                            .as_deref()
                            .map(|l| format!("{l} m"))
                            .unwrap_or_else(|| "-".to_string())
                    );
                }
            }
            TdrResult::NoData { raw, note } => {
                let _ = writeln!(out, "{interface}: {note}");
                for line in raw.lines() {
                    let _ = writeln!(out, "  | {line}");
                }
            }
            TdrResult::Error { message, .. } => {
                let _ = writeln!(out, "{interface}: error: {message}");
            }
        }
    }
    out
}

fn render_lookup(result: &MacLookupResult) -> String {
    let place = result.switch.as_deref().unwrap_or("central switch");
    match &result.interface {
        Some(interface) => format!(
            "{} found on {} of site {}, interface {}",
            result.mac, place, result.site, interface
        ),
        None => format!(
            "{} not found in the MAC table of {} of site {}",
            result.mac, place, result.site
        ),
    }
}

fn render_trace(trace: &MacTrace) -> String {
    let mut out = render_lookup(&trace.lookup);
    if let Some(neighbor) = &trace.neighbor {
        let _ = write!(
            out,
            "\nCDP neighbor: {} ({})",
            neighbor.neighbor_name.as_deref().unwrap_or("unknown"),
            neighbor.neighbor_address.as_deref().unwrap_or("no address")
        );
        if let Some(port) = &neighbor.remote_interface {
            let _ = write!(out, ", port {port}");
        }
    }
    match &trace.outcome {
        TraceOutcome::NotFound => {}
        TraceOutcome::NeighborFailed { message } => {
            let _ = write!(out, "\nNeighbor lookup failed: {message}");
        }
        TraceOutcome::Unmapped => {
            let _ = write!(out, "\nThe neighbor is not an access switch of this site");
        }
        TraceOutcome::Mapped { switch } => {
            let _ = write!(out, "\nAccess switch: {}", switch.display_name());
        }
    }
    out
}
