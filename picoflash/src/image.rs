//! Program images destined for flash.

use crate::error::{Error, Result};
use log::debug;
use std::path::Path;

/// The RP2040 XIP flash base, where images load unless told otherwise.
pub const DEFAULT_LOAD_ADDR: u32 = 0x1000_0000;

/// A program to install: a load address and the raw bytes.
///
/// Immutable once handed to the flasher. Object-file formats (ELF,
/// UF2) are someone else's job; this loader takes flat binaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Absolute load address in flash.
    pub addr: u32,
    /// Image contents.
    pub data: Vec<u8>,
}

impl Image {
    /// Wrap in-memory bytes as an image at `addr`.
    #[must_use]
    pub fn new(addr: u32, data: Vec<u8>) -> Self {
        Self { addr, data }
    }

    /// Load a flat binary from disk.
    pub fn from_bin_file(path: &Path, addr: u32) -> Result<Self> {
        let data = std::fs::read(path)
            .map_err(|e| Error::Image(format!("{}: {e}", path.display())))?;
        if data.is_empty() {
            return Err(Error::Image(format!("{}: image is empty", path.display())));
        }
        if u32::try_from(data.len()).is_err() {
            return Err(Error::Image(format!(
                "{}: image is larger than the protocol can address",
                path.display()
            )));
        }
        debug!("loaded {} bytes from {}", data.len(), path.display());
        Ok(Self { addr, data })
    }

    /// Image length in bytes.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // length is checked at load
    pub fn len(&self) -> u32 {
        self.data.len() as u32
    }

    /// Whether the image carries no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The image data zero-padded up to the device's write granularity.
    #[must_use]
    pub fn padded(&self, write_size: u32) -> Vec<u8> {
        let padded_len = (self.data.len() as u64)
            .div_ceil(u64::from(write_size))
            * u64::from(write_size);
        let mut data = self.data.clone();
        #[allow(clippy::cast_possible_truncation)] // fits: len is u32-bounded
        data.resize(padded_len as usize, 0);
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bin_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("app.bin");
        std::fs::write(&path, [1, 2, 3]).expect("write");

        let image = Image::from_bin_file(&path, DEFAULT_LOAD_ADDR).expect("load");
        assert_eq!(image.addr, 0x10000000);
        assert_eq!(image.data, vec![1, 2, 3]);
    }

    #[test]
    fn test_missing_file_is_image_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = Image::from_bin_file(&dir.path().join("nope.bin"), 0).unwrap_err();
        assert!(matches!(err, Error::Image(_)));
    }

    #[test]
    fn test_empty_file_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("empty.bin");
        std::fs::write(&path, []).expect("write");
        let err = Image::from_bin_file(&path, 0).unwrap_err();
        assert!(matches!(err, Error::Image(_)));
    }

    #[test]
    fn test_padding() {
        let image = Image::new(0, vec![0xAB; 300]);
        let padded = image.padded(256);
        assert_eq!(padded.len(), 512);
        assert_eq!(&padded[..300], &[0xAB; 300][..]);
        assert!(padded[300..].iter().all(|&b| b == 0));

        // Already aligned data gains nothing.
        assert_eq!(Image::new(0, vec![1; 256]).padded(256).len(), 256);
    }
}
