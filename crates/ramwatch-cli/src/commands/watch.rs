//! Watch command implementation.
//!
//! Polls the watched variables every interval and prints the ones whose
//! values changed. Locks given with `--lock` are rewritten before every poll;
//! pressing `f` freezes every watched variable at its current value.

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use owo_colors::OwoColorize;
use ramwatch_core::{AccessContext, LiveVariable, LockSet, Session};
use tracing::{debug, info, warn};

use super::hex_utils::parse_assignment;
use crate::input::{KeyAction, spawn_keyboard_monitor};
use crate::shutdown::ShutdownSignal;

/// Remembers the last values shown so only changes are printed
pub struct Watcher {
    variables: Vec<Arc<LiveVariable>>,
    last: HashMap<String, Vec<String>>,
}

impl Watcher {
    pub fn new(variables: Vec<Arc<LiveVariable>>) -> Self {
        Self {
            variables,
            last: HashMap::new(),
        }
    }

    pub fn variables(&self) -> &[Arc<LiveVariable>] {
        &self.variables
    }

    /// Show every value again on the next poll
    pub fn forget(&mut self) {
        self.last.clear();
    }

    /// Read every watched variable, returning a line for each one that changed
    pub fn poll(&mut self, ctx: &AccessContext<'_>) -> Vec<String> {
        let mut lines = Vec::new();
        for variable in &self.variables {
            let values = variable.get_values(ctx, None);
            if self.last.get(variable.name()) == Some(&values) {
                continue;
            }
            lines.push(format!("{} = {}", variable.name(), values.join(", ")));
            self.last.insert(variable.name().to_string(), values);
        }
        lines
    }
}

fn reapply(locks: &LockSet, ctx: &AccessContext<'_>) {
    match locks.reapply(ctx) {
        Ok(true) => {}
        Ok(false) => debug!("Some locks could not be rewritten"),
        Err(e) => warn!("Locks not applied: {}", e),
    }
}

/// Run the watch command
pub fn run(
    session: &Session,
    names: &[String],
    locks: &[String],
    interval: Duration,
    shutdown: Arc<ShutdownSignal>,
) -> Result<()> {
    let variables = if names.is_empty() {
        session.table().iter().cloned().collect()
    } else {
        names
            .iter()
            .map(|name| session.variable(name).cloned())
            .collect::<ramwatch_core::Result<Vec<_>>>()?
    };

    let mut held = LockSet::new();
    {
        let bases = session.snapshot();
        let ctx = session.context(&bases);
        for arg in locks {
            let (name, value) = parse_assignment(arg)?;
            let variable = session.variable(&name)?;
            match held.lock_value(&ctx, variable, &value) {
                0 => warn!("{} has no live instances to lock", name),
                count => info!("Locked {} = {} ({} instances)", name, value, count),
            }
        }
    }

    let (sender, receiver) = mpsc::channel();
    let keyboard = spawn_keyboard_monitor(Arc::clone(&shutdown), sender);
    let mut watcher = Watcher::new(variables);
    let mut frozen: Option<LockSet> = None;

    println!(
        "Watching {} variables every {}ms ({})",
        watcher.variables().len(),
        interval.as_millis(),
        "f: freeze, r: redraw, q/Esc: quit".dimmed()
    );

    while !shutdown.is_shutdown() {
        let bases = session.snapshot();
        let ctx = session.context(&bases);

        for action in receiver.try_iter() {
            match action {
                KeyAction::ToggleFreeze => {
                    frozen = match frozen.take() {
                        Some(_) => {
                            println!("{}", "Released frozen values".yellow());
                            None
                        }
                        None => {
                            let mut set = LockSet::new();
                            for variable in watcher.variables() {
                                set.lock_current(&ctx, variable);
                            }
                            println!("{}", format!("Froze {} values", set.len()).yellow());
                            Some(set)
                        }
                    };
                }
                KeyAction::Redraw => watcher.forget(),
                KeyAction::Quit => {}
            }
        }

        reapply(&held, &ctx);
        if let Some(set) = &frozen {
            reapply(set, &ctx);
        }

        for line in watcher.poll(&ctx) {
            println!("{}", line);
        }

        if shutdown.wait(interval) {
            break;
        }
    }

    if keyboard.join().is_err() {
        warn!("Keyboard monitor panicked");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ramwatch_core::{Endianness, RamImage, SessionConfig, SpecialRegistry, VariableTable};

    fn session(image: Arc<RamImage>) -> Session {
        let table = VariableTable::from_json(
            r#"{"variables": [
                {"name": "Lives", "offsets": {"default": "0x80000004"}, "type": "u8", "base": "ram"},
                {"name": "Timer", "offsets": {"default": "0x80000008"}, "type": "u16", "base": "ram"}
            ]}"#,
            &SpecialRegistry::with_builtins(),
        )
        .unwrap();
        let config = SessionConfig::builder()
            .host_endianness(Endianness::Big)
            .build();
        Session::new(image, &config, Arc::new(table))
    }

    #[test]
    fn test_watcher_prints_only_changes() {
        let image = Arc::new(RamImage::new(vec![0; 0x20], 0));
        let session = session(Arc::clone(&image));
        let mut watcher = Watcher::new(session.table().iter().cloned().collect());

        let bases = session.snapshot();
        let ctx = session.context(&bases);
        assert_eq!(watcher.poll(&ctx), vec!["Lives = 0", "Timer = 0"]);
        assert!(watcher.poll(&ctx).is_empty());

        session.set("Timer", "300").unwrap();
        assert_eq!(watcher.poll(&ctx), vec!["Timer = 300"]);

        watcher.forget();
        assert_eq!(watcher.poll(&ctx).len(), 2);
    }

    #[test]
    fn test_run_applies_locks_then_stops() {
        let image = Arc::new(RamImage::new(vec![0; 0x20], 0));
        let session = session(Arc::clone(&image));
        let shutdown = Arc::new(ShutdownSignal::new());

        let stopper = Arc::clone(&shutdown);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            stopper.trigger();
        });

        run(
            &session,
            &["Lives".to_string()],
            &["Lives=7".to_string()],
            Duration::from_millis(10),
            shutdown,
        )
        .unwrap();
        handle.join().unwrap();

        assert_eq!(session.get("Lives").unwrap(), vec!["7".to_string()]);
        assert!(!image.is_paused());
    }

    #[test]
    fn test_run_rejects_unknown_variable() {
        let image = Arc::new(RamImage::new(vec![0; 0x20], 0));
        let session = session(image);
        let result = run(
            &session,
            &["Stars".to_string()],
            &[],
            Duration::from_millis(10),
            Arc::new(ShutdownSignal::new()),
        );
        assert!(result.is_err());
    }
}
