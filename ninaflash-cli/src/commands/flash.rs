//! Firmware and certificate upload commands.

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use ninaflash::Flasher;
use ninaflash::target::nina::{CERTIFICATES_LIMIT, CERTIFICATES_OFFSET, FIRMWARE_OFFSET};
use std::fs;
use std::path::Path;

use crate::commands::{ensure_not_interrupted, open_flasher};
use crate::config::Config;
use crate::{Cli, CliError, use_fancy_output};

/// Percentage progress bar on stderr, hidden when quiet or not a terminal.
fn progress_bar(cli: &Cli) -> ProgressBar {
    if cli.quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(100);
    #[allow(clippy::unwrap_used)] // Static template string
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb
}

/// Route the flasher's progress callback into `pb`.
fn attach_progress(flasher: &mut dyn Flasher, pb: &ProgressBar) {
    let bar = pb.clone();
    flasher.set_progress(Some(Box::new(move |percent| {
        bar.set_position(u64::from(percent));
    })));
}

/// Settle the bar on the outcome of a transfer.
///
/// The callback stops short of 100%, so success fills the bar. A failure
/// leaves it where it stopped.
fn finish_bar<T>(pb: &ProgressBar, result: ninaflash::Result<T>) -> ninaflash::Result<T> {
    match result {
        Ok(value) => {
            pb.set_position(100);
            pb.finish_with_message("written");
            Ok(value)
        },
        Err(e) => {
            pb.abandon_with_message("failed");
            Err(e)
        },
    }
}

/// Run `op` on an open flasher and close it whatever the outcome.
fn with_flasher<F>(cli: &Cli, config: &Config, op: F) -> Result<()>
where
    F: FnOnce(&mut dyn Flasher) -> Result<()>,
{
    let mut flasher = open_flasher(cli, config)?;
    if let Err(err) = ensure_not_interrupted() {
        flasher.close();
        return Err(err);
    }
    let result = op(flasher.as_mut());
    flasher.close();
    result
}

/// Flash command implementation.
pub(crate) fn cmd_flash(
    cli: &Cli,
    config: &Config,
    firmware: &Path,
    no_verify: bool,
) -> Result<()> {
    if !cli.quiet {
        eprintln!(
            "{} Loading firmware {}",
            style("📦").cyan(),
            firmware.display()
        );
    }
    let data = fs::read(firmware)
        .with_context(|| format!("Failed to read firmware {}", firmware.display()))?;
    if data.is_empty() {
        return Err(CliError::Usage(format!("{} is empty", firmware.display())).into());
    }
    let verify = !(no_verify || config.flash.no_verify);

    with_flasher(cli, config, |flasher| {
        let pb = progress_bar(cli);
        pb.set_message("writing");
        attach_progress(flasher, &pb);

        finish_bar(&pb, flasher.flash_region(FIRMWARE_OFFSET, &data))
            .context("Firmware upload failed")?;

        if verify {
            if !cli.quiet {
                eprintln!("{} Verifying MD5...", style("🔍").cyan());
            }
            flasher
                .verify(&data)
                .context("Firmware verification failed")?;
            if !cli.quiet {
                eprintln!("{} MD5 matches", style("✓").green());
            }
        }

        if !cli.quiet {
            eprintln!(
                "\n{} Firmware upload completed ({} bytes)",
                style("🎉").green().bold(),
                data.len()
            );
        }
        Ok(())
    })
}

/// Certificates command implementation.
pub(crate) fn cmd_certificates(cli: &Cli, config: &Config, file: &Path) -> Result<()> {
    let data =
        fs::read(file).with_context(|| format!("Failed to read certificates {}", file.display()))?;
    if data.is_empty() {
        return Err(CliError::Usage(format!("{} is empty", file.display())).into());
    }
    if data.len() > CERTIFICATES_LIMIT {
        return Err(CliError::Usage(format!(
            "certificates data {} exceeds limit of {CERTIFICATES_LIMIT} bytes",
            data.len()
        ))
        .into());
    }

    with_flasher(cli, config, |flasher| {
        if !cli.quiet {
            eprintln!(
                "{} Uploading {} bytes of certificates at 0x{CERTIFICATES_OFFSET:08X}",
                style("📜").cyan(),
                data.len()
            );
        }
        let pb = progress_bar(cli);
        pb.set_message("writing");
        attach_progress(flasher, &pb);

        finish_bar(&pb, flasher.upload_certificates(&data))
            .context("Certificate upload failed")?;

        if !cli.quiet {
            eprintln!(
                "\n{} Certificate upload completed",
                style("🎉").green().bold()
            );
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_bar_fills_on_success() {
        let pb = ProgressBar::hidden();
        pb.set_length(100);
        pb.set_position(81);

        finish_bar(&pb, Ok(())).unwrap();
        assert!(pb.is_finished());
        assert_eq!(pb.position(), 100);
        assert_eq!(pb.message(), "written");
    }

    #[test]
    fn test_finish_bar_abandons_on_failure() {
        let pb = ProgressBar::hidden();
        pb.set_length(100);
        pb.set_position(40);

        let err = finish_bar::<()>(&pb, Err(ninaflash::Error::DeviceNotFound)).unwrap_err();
        assert!(matches!(err, ninaflash::Error::DeviceNotFound));
        assert!(pb.is_finished());
        assert_eq!(pb.position(), 40);
        assert_eq!(pb.message(), "failed");
    }
}
