//! Frozen variables.
//!
//! A lock remembers a value per address and rewrites it on every poll, so the
//! game cannot move it for longer than one refresh interval.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::context::AccessContext;
use crate::error::Result;
use crate::special::READ_ERROR;
use crate::variable::LiveVariable;

/// One variable held at one value at one address
#[derive(Debug, Clone)]
pub struct VariableLock {
    pub variable: Arc<LiveVariable>,
    pub address: u64,
    pub value: String,
}

impl VariableLock {
    /// Rewrite the held value
    pub fn apply(&self, ctx: &AccessContext<'_>) -> Result<bool> {
        self.variable
            .set_value(ctx, &self.value, Some(&[self.address]))
    }
}

#[derive(Debug, Clone, Default)]
pub struct LockSet {
    locks: Vec<VariableLock>,
}

impl LockSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every instance of `variable` at `value`
    ///
    /// Returns the number of addresses locked.
    pub fn lock_value(
        &mut self,
        ctx: &AccessContext<'_>,
        variable: &Arc<LiveVariable>,
        value: &str,
    ) -> usize {
        let addresses = variable.addresses(ctx.region, ctx.bases);
        for &address in &addresses {
            self.add(VariableLock {
                variable: Arc::clone(variable),
                address,
                value: value.to_string(),
            });
        }
        addresses.len()
    }

    /// Hold every instance of `variable` at the value it has right now
    ///
    /// Unreadable instances are skipped.
    pub fn lock_current(&mut self, ctx: &AccessContext<'_>, variable: &Arc<LiveVariable>) -> usize {
        let addresses = variable.addresses(ctx.region, ctx.bases);
        let values = variable.get_values(ctx, Some(&addresses));
        let mut locked = 0;
        for (address, value) in addresses.into_iter().zip(values) {
            if value == READ_ERROR {
                debug!("Not locking unreadable {} at {:#x}", variable.name(), address);
                continue;
            }
            self.add(VariableLock {
                variable: Arc::clone(variable),
                address,
                value,
            });
            locked += 1;
        }
        locked
    }

    /// Add a lock, replacing any existing lock on the same variable and address
    pub fn add(&mut self, lock: VariableLock) {
        self.locks
            .retain(|l| !(l.variable.name() == lock.variable.name() && l.address == lock.address));
        self.locks.push(lock);
    }

    /// Drop every lock on `name`, returning how many were removed
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.locks.len();
        self.locks.retain(|l| l.variable.name() != name);
        before - self.locks.len()
    }

    pub fn clear(&mut self) {
        self.locks.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariableLock> {
        self.locks.iter()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Rewrite every held value inside one transaction
    ///
    /// Returns whether every write succeeded.
    pub fn reapply(&self, ctx: &AccessContext<'_>) -> Result<bool> {
        if self.locks.is_empty() {
            return Ok(true);
        }

        let tx = ctx.begin()?;
        let mut success = true;
        for lock in &self.locks {
            if !lock.apply(ctx)? {
                warn!(
                    "Failed to reapply lock on {} at {:#x}",
                    lock.variable.name(),
                    lock.address
                );
                success = false;
            }
        }
        tx.finish()?;
        Ok(success)
    }
}
