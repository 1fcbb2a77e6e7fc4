use crate::error::Result;
use crate::memory::MemoryStream;
use crate::region::Region;
use crate::resolve::BaseSnapshot;
use crate::transaction::{Transaction, Transactor};

/// Everything a getter or setter needs to touch live memory
#[derive(Clone, Copy)]
pub struct AccessContext<'a> {
    pub stream: &'a MemoryStream,
    pub transactor: &'a Transactor,
    pub region: Region,
    pub bases: &'a BaseSnapshot,
}

impl<'a> AccessContext<'a> {
    pub fn new(
        stream: &'a MemoryStream,
        transactor: &'a Transactor,
        region: Region,
        bases: &'a BaseSnapshot,
    ) -> Self {
        Self {
            stream,
            transactor,
            region,
            bases,
        }
    }

    /// Pause the process, or join the transaction already open
    pub fn begin(&self) -> Result<Transaction<'a>> {
        self.transactor.begin()
    }

    /// Same context seen through a different base snapshot
    pub fn with_bases<'b>(&self, bases: &'b BaseSnapshot) -> AccessContext<'b>
    where
        'a: 'b,
    {
        AccessContext {
            stream: self.stream,
            transactor: self.transactor,
            region: self.region,
            bases,
        }
    }
}
