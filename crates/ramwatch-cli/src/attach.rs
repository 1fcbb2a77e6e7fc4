//! Attaching to the emulator, with retry while it is not running yet.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use ramwatch_core::memory::layout::timing;
use ramwatch_core::{ForeignProcess, ProcessHandle, RamImage, SessionConfig};
use tracing::{debug, info, warn};

use crate::cli::TargetArgs;
use crate::shutdown::ShutdownSignal;

/// What a session is attached to
pub enum Target {
    Live(Arc<ProcessHandle>),
    Image(Arc<RamImage>),
}

impl Target {
    pub fn process(&self) -> Arc<dyn ForeignProcess> {
        match self {
            Target::Live(process) => Arc::clone(process) as Arc<dyn ForeignProcess>,
            Target::Image(image) => Arc::clone(image) as Arc<dyn ForeignProcess>,
        }
    }

    /// Write a RAM image back to its file; live processes need nothing
    pub fn persist(&self) -> Result<()> {
        match self {
            Target::Image(image) => {
                image.save().context("Failed to save RAM image")?;
                info!("Saved {}", image.describe());
            }
            Target::Live(_) => warn!("--save only applies to RAM images"),
        }
        Ok(())
    }
}

/// Attach to whatever `args` and `config` name.
///
/// A process looked up by name is retried until it appears, unless
/// `--no-wait` was given. Returns `Ok(None)` if shutdown was signaled first.
pub fn attach_with_retry(
    args: &TargetArgs,
    config: &SessionConfig,
    shutdown: &ShutdownSignal,
) -> Result<Option<Target>> {
    if let Some(path) = &args.image {
        let image = RamImage::load(path, config.mapping.process_offset)
            .with_context(|| format!("Failed to load RAM image {}", path.display()))?;
        return Ok(Some(Target::Image(Arc::new(image))));
    }

    if let Some(pid) = args.pid {
        let process = ProcessHandle::open(pid)?;
        return Ok(Some(Target::Live(Arc::new(process))));
    }

    let Some(name) = config.process_name.as_deref() else {
        bail!("No emulator given: pass --pid, --process-name or --image, or set process_name");
    };

    let delay = Duration::from_millis(timing::ATTACH_RETRY_DELAY_MS);
    let mut attempts = 0u32;
    loop {
        if shutdown.is_shutdown() {
            return Ok(None);
        }
        attempts += 1;

        match ProcessHandle::find_and_open(name) {
            Ok(process) => {
                info!("Found {} (pid {})", process.name, process.pid);
                return Ok(Some(Target::Live(Arc::new(process))));
            }
            Err(e) if e.is_not_found() && !args.no_wait => {
                if attempts == 1 {
                    info!("Waiting for {}...", name);
                } else {
                    debug!("{} not running yet (attempt {})", name, attempts);
                }
            }
            Err(e) => return Err(e.into()),
        }

        if shutdown.wait(delay) {
            return Ok(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ramwatch_core::ReadMemory;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_attach_image() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[1, 2, 3, 4]).unwrap();

        let args = TargetArgs {
            image: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let config = SessionConfig::builder().process_offset(0x1000).build();
        let target = attach_with_retry(&args, &config, &ShutdownSignal::new())
            .unwrap()
            .unwrap();

        assert_eq!(target.process().read_bytes(0x1002, 2).unwrap(), vec![3, 4]);
        assert!(matches!(target, Target::Image(_)));
    }

    #[test]
    fn test_missing_image_is_an_error() {
        let args = TargetArgs {
            image: Some("/nonexistent/ram.bin".into()),
            ..Default::default()
        };
        assert!(attach_with_retry(&args, &SessionConfig::default(), &ShutdownSignal::new()).is_err());
    }

    #[test]
    fn test_no_target_is_an_error() {
        let result = attach_with_retry(
            &TargetArgs::default(),
            &SessionConfig::default(),
            &ShutdownSignal::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_shutdown_stops_waiting() {
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();
        let config = SessionConfig::builder()
            .process_name("no-such-emulator-ramwatch")
            .build();
        let result = attach_with_retry(&TargetArgs::default(), &config, &shutdown).unwrap();
        assert!(result.is_none());
    }
}
