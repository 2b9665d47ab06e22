//! Read command implementation.

use anyhow::{Context, Result};
use console::style;
use picoflash::Flasher;
use std::path::Path;

use crate::config::Config;
use crate::{Cli, open_transport};

pub(crate) fn run(
    cli: &Cli,
    config: &mut Config,
    out: &Path,
    addr: u32,
    length: u32,
) -> Result<()> {
    let transport = open_transport(cli, config)?;
    let mut flasher = Flasher::new(transport);

    flasher.sync().context("establishing sync")?;
    let device = flasher.info().context("reading device info")?;

    // Stay within the device's single-response payload limit.
    let mut data = Vec::new();
    let mut offset = 0u32;
    while offset < length {
        let chunk = device.max_data_len.min(length - offset);
        let chunk_addr = addr
            .checked_add(offset)
            .context("address range overflows 32 bits")?;
        let bytes = flasher
            .read(chunk_addr, chunk)
            .with_context(|| format!("reading {chunk} bytes at {chunk_addr:#010x}"))?;
        data.extend_from_slice(&bytes);
        offset += chunk;
    }

    std::fs::write(out, &data).with_context(|| format!("writing {}", out.display()))?;
    if !cli.quiet {
        eprintln!(
            "{} read {length} bytes from {addr:#010x} into {}",
            style("✓").green(),
            out.display()
        );
    }
    Ok(())
}
