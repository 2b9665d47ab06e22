//! Flash command implementation.

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use picoflash::{Flasher, Image};
use std::path::Path;

use crate::config::Config;
use crate::{Cli, open_transport};

fn progress_bar(quiet: bool) -> ProgressBar {
    if quiet || !console::colors_enabled_stderr() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(100);
    #[allow(clippy::unwrap_used)] // Static template string
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}% {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
    bar
}

pub(crate) fn run(cli: &Cli, config: &mut Config, path: &Path, addr: u32) -> Result<()> {
    let image = Image::from_bin_file(path, addr)?;
    if !cli.quiet {
        eprintln!(
            "{} loaded {} ({} bytes) for {:#010x}",
            style("→").cyan(),
            path.display(),
            image.len(),
            image.addr
        );
    }

    let transport = open_transport(cli, config)?;
    let mut flasher = Flasher::new(transport);

    let bar = progress_bar(cli.quiet);
    let result = flasher.program(&image, |stage, done, total| {
        bar.set_message(stage.describe());
        if total > 0 {
            bar.set_position((done * 100 / total) as u64);
        }
    });
    let device = result.with_context(|| format!("flashing {}", path.display()))?;
    bar.finish_and_clear();

    if !cli.quiet {
        eprintln!(
            "{} wrote {} bytes to flash at {:#010x} (device flash: {:#010x}+{:#x})",
            style("✓").green(),
            image.len(),
            image.addr,
            device.flash_addr,
            device.flash_size
        );
        eprintln!(
            "{} flashing completed; the application should now be running",
            style("✓").green().bold()
        );
    }

    Ok(())
}
