//! Flash read-back command.

use anyhow::{Context, Result};
use console::style;
use std::fs;
use std::path::Path;

use crate::Cli;
use crate::commands::{ensure_not_interrupted, open_flasher};
use crate::config::Config;

/// Read command implementation.
pub(crate) fn cmd_read(
    cli: &Cli,
    config: &Config,
    address: u32,
    length: u32,
    output: &Path,
) -> Result<()> {
    if length == 0 {
        return Err(crate::CliError::Usage("length must be greater than zero".into()).into());
    }

    let mut flasher = open_flasher(cli, config)?;
    if !cli.quiet {
        eprintln!(
            "{} Reading {length} bytes at 0x{address:08X}",
            style("📥").cyan()
        );
    }
    let data = ensure_not_interrupted().and_then(|()| {
        flasher
            .read_region(address, length)
            .context("Flash read failed")
    });
    flasher.close();
    let data = data?;

    fs::write(output, &data).with_context(|| format!("Failed to write {}", output.display()))?;
    if !cli.quiet {
        eprintln!(
            "{} Wrote {} bytes to {}",
            style("✓").green(),
            data.len(),
            output.display()
        );
    }
    Ok(())
}
