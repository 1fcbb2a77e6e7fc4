//! Reentrant pausing of the emulator.
//!
//! A multi-field update must never be observed half-applied by the running
//! game, so every write happens while the emulator is paused. Callers nest
//! freely: only the outermost [`Transaction`] pauses and resumes the process.
//!
//! ```text
//! Idle --begin--> Suspended(1) --begin/nest--> Suspended(2) ...
//!      <--release-- Suspended(1) <--release--
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::memory::ForeignProcess;

/// Counts outstanding holds on the "process paused" state
pub struct Transactor {
    process: Arc<dyn ForeignProcess>,
    depth: Mutex<usize>,
    timeout: Duration,
}

impl Transactor {
    pub fn new(process: Arc<dyn ForeignProcess>, timeout: Duration) -> Self {
        Self {
            process,
            depth: Mutex::new(0),
            timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.depth.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Take a hold, pausing the process if this is the first one
    ///
    /// On failure the hold count is unchanged and the caller must not write.
    pub fn begin(&self) -> Result<Transaction<'_>> {
        let mut depth = self.lock();
        if *depth == 0 {
            self.process.suspend(self.timeout).map_err(|e| match e {
                Error::Transaction(_) => e,
                other => Error::Transaction(other.to_string()),
            })?;
            debug!("Paused {}", self.process.describe());
        }
        *depth += 1;
        Ok(Transaction {
            owner: self,
            released: false,
        })
    }

    /// Number of holds currently outstanding
    pub fn depth(&self) -> usize {
        *self.lock()
    }

    pub fn is_suspended(&self) -> bool {
        self.depth() > 0
    }

    fn release(&self) -> Result<()> {
        let mut depth = self.lock();
        match *depth {
            0 => Ok(()),
            1 => {
                *depth = 0;
                self.process.resume().map_err(|e| match e {
                    Error::Transaction(_) => e,
                    other => Error::Transaction(other.to_string()),
                })?;
                debug!("Resumed {}", self.process.describe());
                Ok(())
            }
            _ => {
                *depth -= 1;
                Ok(())
            }
        }
    }
}

/// A hold on the paused state, released on drop
#[must_use = "the process resumes as soon as the transaction is dropped"]
pub struct Transaction<'a> {
    owner: &'a Transactor,
    released: bool,
}

impl<'a> Transaction<'a> {
    /// Take an inner hold without touching the process
    pub fn nest(&self) -> Transaction<'a> {
        let mut depth = self.owner.lock();
        *depth += 1;
        Transaction {
            owner: self.owner,
            released: false,
        }
    }

    /// Release now, reporting a failed resume
    pub fn finish(mut self) -> Result<()> {
        self.released = true;
        self.owner.release()
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = self.owner.release()
        {
            error!("{}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MockProcess;
    use std::sync::atomic::Ordering;

    fn setup() -> (Arc<MockProcess>, Transactor) {
        let process = Arc::new(MockProcess::new(0, 16));
        let transactor = Transactor::new(process.clone(), Duration::from_millis(50));
        (process, transactor)
    }

    #[test]
    fn test_nested_holds_pause_once() {
        let (process, transactor) = setup();

        let outer = transactor.begin().unwrap();
        {
            let inner = transactor.begin().unwrap();
            let nested = inner.nest();
            assert_eq!(transactor.depth(), 3);
            drop(nested);
            inner.finish().unwrap();
            assert!(process.is_paused());
        }
        assert_eq!(process.resumes.load(Ordering::SeqCst), 0);
        outer.finish().unwrap();

        assert_eq!(process.suspends.load(Ordering::SeqCst), 1);
        assert_eq!(process.resumes.load(Ordering::SeqCst), 1);
        assert!(!process.is_paused());
        assert!(!transactor.is_suspended());
    }

    #[test]
    fn test_drop_releases() {
        let (process, transactor) = setup();
        {
            let _tx = transactor.begin().unwrap();
            assert!(process.is_paused());
        }
        assert!(!process.is_paused());
        assert_eq!(transactor.depth(), 0);
    }

    #[test]
    fn test_pause_failure_leaves_count_unchanged() {
        let (process, transactor) = setup();
        process.set_fail_suspend(true);

        let err = transactor.begin().err().unwrap();
        assert!(err.is_transaction());
        assert_eq!(transactor.depth(), 0);
        assert_eq!(process.resumes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_resume_failure_is_reported_by_finish() {
        let (process, transactor) = setup();
        let tx = transactor.begin().unwrap();
        process.set_fail_resume(true);

        assert!(tx.finish().unwrap_err().is_transaction());
        assert_eq!(transactor.depth(), 0);
    }

    #[test]
    fn test_sequential_transactions_pause_each_time() {
        let (process, transactor) = setup();
        transactor.begin().unwrap().finish().unwrap();
        transactor.begin().unwrap().finish().unwrap();
        assert_eq!(process.suspends.load(Ordering::SeqCst), 2);
        assert_eq!(process.resumes.load(Ordering::SeqCst), 2);
    }
}
