//! Keyboard input for the viewer.

use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio_util::sync::CancellationToken;

use crate::domain::Axis;

use super::state::{lock, SharedState, ViewState};

/// Result of handling a key event.
#[derive(Debug, PartialEq, Eq)]
pub enum KeyAction {
    /// Not a recognised key.
    None,
    /// The charted axis changed and the window was cleared.
    AxisChanged(Axis),
    /// Shut the viewer down.
    Quit,
}

/// Applies one key event to the view state.
pub fn handle_key(state: &mut ViewState, key: KeyEvent) -> KeyAction {
    if key.kind != KeyEventKind::Press {
        return KeyAction::None;
    }

    match (key.code, key.modifiers) {
        // raw mode delivers Ctrl+C as a key instead of a signal
        (KeyCode::Char('c'), m) if m.contains(KeyModifiers::CONTROL) => KeyAction::Quit,
        (KeyCode::Left, _) => KeyAction::AxisChanged(state.select_previous_axis()),
        (KeyCode::Right, _) => KeyAction::AxisChanged(state.select_next_axis()),
        _ => KeyAction::None,
    }
}

/// Blocking key reader; run it on the blocking pool.
///
/// Polls with `tick` so cancellation is noticed between keystrokes. A quit
/// key cancels `cancel` for the whole viewer.
pub fn read_keys(state: SharedState, cancel: CancellationToken, tick: Duration) {
    while !cancel.is_cancelled() {
        match event::poll(tick) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(e) => {
                tracing::error!("[INPUT] Terminal poll failed: {}", e);
                cancel.cancel();
                break;
            }
        }

        let key = match event::read() {
            Ok(Event::Key(key)) => key,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!("[INPUT] Terminal read failed: {}", e);
                cancel.cancel();
                break;
            }
        };

        let action = handle_key(&mut lock(&state), key);
        match action {
            KeyAction::Quit => {
                tracing::info!("[INPUT] Exit requested");
                cancel.cancel();
            }
            KeyAction::AxisChanged(axis) => tracing::debug!("[INPUT] Charting {}-axis", axis.label()),
            KeyAction::None => {}
        }
    }
}
