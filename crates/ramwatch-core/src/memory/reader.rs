use std::time::Duration;

use crate::error::Result;

/// Raw byte reads from a foreign address space
pub trait ReadMemory: Send + Sync {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>>;
}

/// Raw byte writes into a foreign address space
pub trait WriteMemory: Send + Sync {
    fn write_bytes(&self, address: u64, data: &[u8]) -> Result<()>;
}

/// Execution control over the foreign process
///
/// Implementations are not expected to count nested calls; that is the job
/// of [`crate::transaction::Transactor`].
pub trait ProcessControl: Send + Sync {
    /// Stop the process from advancing, failing if it does not comply in `timeout`
    fn suspend(&self, timeout: Duration) -> Result<()>;

    fn resume(&self) -> Result<()>;
}

/// Everything the memory layer needs from an attached emulator
pub trait ForeignProcess: ReadMemory + WriteMemory + ProcessControl {
    /// Short description for logs
    fn describe(&self) -> String;
}
