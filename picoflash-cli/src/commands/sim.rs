//! Simulated device server.
//!
//! Accepts TCP connections and runs one independent bootloader session
//! per client: fresh flash model, fresh parse state, no cross-session
//! locking. The server keeps accepting after a session ends in a
//! simulated application launch.

use anyhow::{Context, Result};
use console::style;
use log::{info, warn};
use picoflash::transport::TcpTransport;
use picoflash::{CommandProcessor, DeviceInfo, FlashModel, SessionOutcome, Transport};
use std::net::{TcpListener, TcpStream};

use crate::Cli;

pub(crate) fn run(cli: &Cli, listen: &str, geometry: DeviceInfo) -> Result<()> {
    let listener = TcpListener::bind(listen).with_context(|| format!("binding {listen}"))?;
    let local = listener.local_addr().context("resolving listen address")?;

    if !cli.quiet {
        eprintln!(
            "{} simulated device listening on {local} \
             (flash {:#010x}+{:#x}, erase {}, write {}, max payload {})",
            style("→").cyan(),
            geometry.flash_addr,
            geometry.flash_size,
            geometry.erase_size,
            geometry.write_size,
            geometry.max_data_len
        );
    }

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                std::thread::spawn(move || handle_session(stream, geometry));
            },
            Err(e) => warn!("accept failed: {e}"),
        }
    }
    Ok(())
}

fn handle_session(stream: TcpStream, geometry: DeviceInfo) {
    let transport = match TcpTransport::from_stream(stream) {
        Ok(transport) => transport,
        Err(e) => {
            warn!("could not set up session: {e}");
            return;
        },
    };
    let peer = transport.name().to_string();
    info!("{peer}: session started");

    let mut processor = CommandProcessor::new(transport, FlashModel::new(geometry));
    match processor.run() {
        Ok(SessionOutcome::Launched { addr }) => {
            info!("{peer}: session ended, application running at {addr:#010x}");
        },
        Ok(SessionOutcome::Disconnected) => info!("{peer}: client disconnected"),
        Err(e) => warn!("{peer}: session failed: {e}"),
    }
}
