//! Mock foreign process for testing.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use super::{ForeignProcess, ProcessControl, ReadMemory, WriteMemory};
use crate::error::{Error, Result};

/// In-memory process with access counters and injectable faults
pub struct MockProcess {
    base: u64,
    data: Mutex<Vec<u8>>,
    faulting: HashSet<u64>,
    fail_suspend: AtomicBool,
    fail_resume: AtomicBool,
    paused: AtomicBool,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
    pub suspends: AtomicUsize,
    pub resumes: AtomicUsize,
}

impl MockProcess {
    pub fn new(base: u64, size: usize) -> Self {
        MockProcessBuilder::new(base, size).build()
    }

    fn check(&self, address: u64, size: usize) -> std::result::Result<usize, String> {
        if address < self.base {
            return Err(format!("address below base {:#x}", self.base));
        }
        if (address..address + size as u64).any(|a| self.faulting.contains(&a)) {
            return Err("access violation".to_string());
        }
        let offset = (address - self.base) as usize;
        let len = self.data.lock().unwrap().len();
        if offset + size > len {
            return Err(format!("access of {} bytes exceeds size {}", size, len));
        }
        Ok(offset)
    }

    /// Peek without counting an access
    pub fn peek(&self, address: u64, size: usize) -> Vec<u8> {
        let offset = (address - self.base) as usize;
        self.data.lock().unwrap()[offset..offset + size].to_vec()
    }

    /// Poke without counting an access
    pub fn poke(&self, address: u64, bytes: &[u8]) {
        let offset = (address - self.base) as usize;
        self.data.lock().unwrap()[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn accesses(&self) -> usize {
        self.reads.load(Ordering::SeqCst) + self.writes.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn set_fail_suspend(&self, fail: bool) {
        self.fail_suspend.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_resume(&self, fail: bool) {
        self.fail_resume.store(fail, Ordering::SeqCst);
    }
}

impl ReadMemory for MockProcess {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let offset = self
            .check(address, size)
            .map_err(|message| Error::MemoryReadFailed { address, message })?;
        Ok(self.data.lock().unwrap()[offset..offset + size].to_vec())
    }
}

impl WriteMemory for MockProcess {
    fn write_bytes(&self, address: u64, data: &[u8]) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let offset = self
            .check(address, data.len())
            .map_err(|message| Error::MemoryWriteFailed { address, message })?;
        self.data.lock().unwrap()[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }
}

impl ProcessControl for MockProcess {
    fn suspend(&self, _timeout: Duration) -> Result<()> {
        self.suspends.fetch_add(1, Ordering::SeqCst);
        if self.fail_suspend.load(Ordering::SeqCst) {
            return Err(Error::Transaction("mock process exited".to_string()));
        }
        self.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn resume(&self) -> Result<()> {
        self.resumes.fetch_add(1, Ordering::SeqCst);
        if self.fail_resume.load(Ordering::SeqCst) {
            return Err(Error::Transaction("mock process exited".to_string()));
        }
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl ForeignProcess for MockProcess {
    fn describe(&self) -> String {
        format!("mock process (base: {:#x})", self.base)
    }
}

/// Builder for [`MockProcess`]
pub struct MockProcessBuilder {
    base: u64,
    data: Vec<u8>,
    faulting: HashSet<u64>,
}

impl MockProcessBuilder {
    pub fn new(base: u64, size: usize) -> Self {
        Self {
            base,
            data: vec![0; size],
            faulting: HashSet::new(),
        }
    }

    /// Place bytes at an absolute address
    pub fn bytes(mut self, address: u64, bytes: &[u8]) -> Self {
        let offset = (address - self.base) as usize;
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        self
    }

    /// Make every access touching `address` fail
    pub fn faulting(mut self, address: u64) -> Self {
        self.faulting.insert(address);
        self
    }

    pub fn build(self) -> MockProcess {
        MockProcess {
            base: self.base,
            data: Mutex::new(self.data),
            faulting: self.faulting,
            fail_suspend: AtomicBool::new(false),
            fail_resume: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            suspends: AtomicUsize::new(0),
            resumes: AtomicUsize::new(0),
        }
    }
}
