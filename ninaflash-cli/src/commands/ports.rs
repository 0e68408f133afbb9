//! Serial port listing and watching.

use anyhow::{Context, Result};
use console::style;
use ninaflash::{NativePortEnumerator, PortChange, PortEnumerator, PortWatcher};
use std::time::Duration;

use crate::Cli;
use crate::config::Config;

/// List ports command implementation.
pub(crate) fn cmd_list_ports(json: bool) -> Result<()> {
    let ports = NativePortEnumerator
        .list_ports()
        .context("Failed to list serial ports")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }

    eprintln!("{}", style("Available serial ports").bold().underlined());
    if ports.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return Ok(());
    }

    for port in &ports {
        let vid_pid = if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
            format!(" ({vid:04X}:{pid:04X})")
        } else {
            String::new()
        };
        let product = port
            .product
            .as_deref()
            .map(|p| format!(" - {}", style(p).dim()))
            .unwrap_or_default();

        eprintln!(
            "  {} {}{}{}",
            style("•").green(),
            style(&port.name).cyan(),
            vid_pid,
            product
        );
    }
    Ok(())
}

/// Watch command implementation.
///
/// Prints the new port on stdout. Prints nothing there when no single new
/// port shows up before the timeout.
pub(crate) fn cmd_watch(cli: &Cli, config: &Config, timeout_ms: Option<u64>) -> Result<()> {
    let mut watch = config.watch_config();
    if let Some(ms) = timeout_ms {
        watch = watch.with_timeout(Duration::from_millis(ms));
    }

    let mut watcher = PortWatcher::with_config(NativePortEnumerator, watch);
    let before = watcher.snapshot()?;
    if !cli.quiet {
        eprintln!(
            "{} Watching {} port(s) for {:?}, reset or plug in the board now",
            style("👀").cyan(),
            before.len(),
            watch.timeout
        );
    }

    match watcher.wait_for_new_port(&before)? {
        PortChange::Replaced(name) => println!("{name}"),
        PortChange::Unchanged => {
            if !cli.quiet {
                eprintln!("{} No new port appeared", style("ℹ").blue());
            }
        },
    }
    Ok(())
}
