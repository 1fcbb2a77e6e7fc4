use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use tracing::debug;

use crate::shutdown::ShutdownSignal;

/// What a key press asks the watch loop to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Esc, q or Ctrl+C
    Quit,
    /// `f`: hold the watched variables at their current values, or release them
    ToggleFreeze,
    /// `r`: print every watched value on the next poll, changed or not
    Redraw,
}

/// Spawn a thread that turns key presses into [`KeyAction`]s.
///
/// `Quit` also triggers `shutdown`, so the thread stops on its own. It stops
/// too once the receiving end is dropped.
pub fn spawn_keyboard_monitor(
    shutdown: Arc<ShutdownSignal>,
    actions: Sender<KeyAction>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        debug!("Keyboard monitor started");

        while !shutdown.is_shutdown() {
            if event::poll(Duration::from_millis(100)).unwrap_or(false)
                && let Ok(Event::Key(key_event)) = event::read()
                && let Some(action) = key_action(&key_event)
            {
                debug!("Key {:?} -> {:?}", key_event.code, action);
                if action == KeyAction::Quit {
                    shutdown.trigger();
                    break;
                }
                if actions.send(action).is_err() {
                    break;
                }
            }
        }

        debug!("Keyboard monitor stopped");
    })
}

fn key_action(event: &KeyEvent) -> Option<KeyAction> {
    match event.code {
        KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q') => Some(KeyAction::Quit),
        KeyCode::Char('c') if event.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(KeyAction::Quit)
        }
        KeyCode::Char('f') | KeyCode::Char('F') => Some(KeyAction::ToggleFreeze),
        KeyCode::Char('r') | KeyCode::Char('R') => Some(KeyAction::Redraw),
        _ => None,
    }
}
