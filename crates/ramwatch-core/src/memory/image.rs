//! Offline RAM image
//!
//! A RAM dump loaded from disk that stands in for a live emulator. Nothing
//! advances on its own, so pausing is a no-op that only tracks state.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info};

use super::{ForeignProcess, ProcessControl, ReadMemory, WriteMemory};
use crate::error::{Error, Result};

pub struct RamImage {
    path: Option<PathBuf>,
    base: u64,
    data: RwLock<Vec<u8>>,
    paused: AtomicBool,
}

impl RamImage {
    /// Wrap an in-memory buffer that starts at host address `base`
    pub fn new(data: Vec<u8>, base: u64) -> Self {
        Self {
            path: None,
            base,
            data: RwLock::new(data),
            paused: AtomicBool::new(false),
        }
    }

    /// Load an image file that starts at host address `base`
    pub fn load<P: AsRef<Path>>(path: P, base: u64) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        info!(
            "Loaded RAM image {} ({} bytes at {:#x})",
            path.display(),
            data.len(),
            base
        );
        Ok(Self {
            path: Some(path.to_path_buf()),
            ..Self::new(data, base)
        })
    }

    /// Write the image back to the file it was loaded from
    pub fn save(&self) -> Result<()> {
        match &self.path {
            Some(path) => self.save_to_path(path),
            None => Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "RAM image has no backing file",
            ))),
        }
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let data = self.data.read().map_err(|_| poisoned())?;
        fs::write(&path, data.as_slice())?;
        info!("Saved RAM image to {}", path.as_ref().display());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.data.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn range(&self, address: u64, size: usize, len: usize) -> std::result::Result<usize, String> {
        let offset = address
            .checked_sub(self.base)
            .ok_or_else(|| format!("address below image base {:#x}", self.base))?
            as usize;
        if offset.checked_add(size).is_none_or(|end| end > len) {
            return Err(format!("{} bytes past end of {}-byte image", size, len));
        }
        Ok(offset)
    }
}

fn poisoned() -> Error {
    Error::Io(std::io::Error::other("RAM image lock poisoned"))
}

impl ReadMemory for RamImage {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        let data = self.data.read().map_err(|_| poisoned())?;
        let offset = self
            .range(address, size, data.len())
            .map_err(|message| Error::MemoryReadFailed { address, message })?;
        Ok(data[offset..offset + size].to_vec())
    }
}

impl WriteMemory for RamImage {
    fn write_bytes(&self, address: u64, bytes: &[u8]) -> Result<()> {
        let mut data = self.data.write().map_err(|_| poisoned())?;
        let len = data.len();
        let offset = self
            .range(address, bytes.len(), len)
            .map_err(|message| Error::MemoryWriteFailed { address, message })?;
        data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

impl ProcessControl for RamImage {
    fn suspend(&self, _timeout: Duration) -> Result<()> {
        debug!("RAM image paused");
        self.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn resume(&self) -> Result<()> {
        debug!("RAM image resumed");
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl ForeignProcess for RamImage {
    fn describe(&self) -> String {
        match &self.path {
            Some(path) => format!("RAM image {}", path.display()),
            None => format!("RAM image ({} bytes)", self.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_write_within_bounds() {
        let image = RamImage::new(vec![0; 16], 0x1000);
        image.write_bytes(0x1004, &[1, 2, 3, 4]).unwrap();
        assert_eq!(image.read_bytes(0x1004, 4).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_out_of_bounds_fails() {
        let image = RamImage::new(vec![0; 16], 0x1000);
        assert!(image.read_bytes(0x0FFF, 1).is_err());
        assert!(image.read_bytes(0x100E, 4).is_err());
        assert!(image.write_bytes(0x1010, &[0]).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_path_buf();

        let image = RamImage::new(vec![0xAB; 8], 0);
        image.write_bytes(2, &[0x01]).unwrap();
        image.save_to_path(&path).unwrap();

        let loaded = RamImage::load(&path, 0).unwrap();
        assert_eq!(loaded.len(), 8);
        assert_eq!(loaded.read_bytes(0, 4).unwrap(), vec![0xAB, 0xAB, 0x01, 0xAB]);
    }

    #[test]
    fn test_save_without_backing_file_fails() {
        let image = RamImage::new(vec![0; 4], 0);
        assert!(image.save().unwrap_err().is_not_found());
    }

    #[test]
    fn test_pause_tracking() {
        let image = RamImage::new(vec![0; 4], 0);
        image.suspend(Duration::from_millis(10)).unwrap();
        assert!(image.is_paused());
        image.resume().unwrap();
        assert!(!image.is_paused());
    }
}
