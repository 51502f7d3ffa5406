//! TUI event handling
//!
//! Polls terminal events (keyboard, resize) with crossterm in a background
//! task and maps key presses to the small set of user actions.

use crossterm::event::{self, Event as CrosstermEvent, KeyCode, KeyEvent, KeyModifiers};
use std::time::Duration;
use tokio::sync::mpsc;

/// Terminal event types
#[derive(Debug, Clone)]
pub enum Event {
    /// Keyboard input event
    Key(KeyEvent),
    /// Terminal resize event
    Resize(u16, u16),
    /// Tick event for periodic UI updates
    Tick,
}

/// User actions derived from keyboard input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Quit the application
    Quit,
    /// Run a detection pass
    Detect,
    /// Run the sync transfer against the held device
    Sync,
    /// Answer the permission prompt with a grant
    Grant,
    /// Answer the permission prompt with a denial
    Deny,
    /// Dismiss the permission prompt without answering
    CloseDialog,
    /// No action
    None,
}

impl From<KeyEvent> for Action {
    fn from(key: KeyEvent) -> Self {
        match key.code {
            KeyCode::Char('q') => Action::Quit,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Action::Quit,
            KeyCode::Esc => Action::CloseDialog,

            KeyCode::Char('d') => Action::Detect,
            KeyCode::Char('s') => Action::Sync,
            KeyCode::Char('y') => Action::Grant,
            KeyCode::Char('n') => Action::Deny,

            _ => Action::None,
        }
    }
}

/// Event handler that polls terminal events in a background task
pub struct EventHandler {
    /// Receiver for events
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
    /// Create a new event handler
    ///
    /// Spawns a background task that polls for terminal events and sends
    /// them through the channel, with a tick at the given rate.
    pub fn new(tick_rate: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut last_tick = std::time::Instant::now();

            loop {
                let timeout = tick_rate
                    .checked_sub(last_tick.elapsed())
                    .unwrap_or(Duration::ZERO);

                if crossterm::event::poll(timeout).unwrap_or(false) {
                    match event::read() {
                        Ok(CrosstermEvent::Key(key)) => {
                            // Ignore key release events on some platforms
                            if key.kind == crossterm::event::KeyEventKind::Press
                                && tx.send(Event::Key(key)).is_err()
                            {
                                break;
                            }
                        }
                        Ok(CrosstermEvent::Resize(width, height)) => {
                            if tx.send(Event::Resize(width, height)).is_err() {
                                break;
                            }
                        }
                        Ok(_) => {} // Ignore other events (mouse, focus, paste)
                        Err(_) => break,
                    }
                }

                if last_tick.elapsed() >= tick_rate {
                    if tx.send(Event::Tick).is_err() {
                        break;
                    }
                    last_tick = std::time::Instant::now();
                }
            }
        });

        Self { rx }
    }

    /// Receive the next event
    ///
    /// Returns None if the event channel is closed.
    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_from_key_quit() {
        let key = KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE);
        assert_eq!(Action::from(key), Action::Quit);

        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(Action::from(ctrl_c), Action::Quit);
    }

    #[test]
    fn test_action_from_key_operations() {
        let detect = KeyEvent::new(KeyCode::Char('d'), KeyModifiers::NONE);
        assert_eq!(Action::from(detect), Action::Detect);

        let sync = KeyEvent::new(KeyCode::Char('s'), KeyModifiers::NONE);
        assert_eq!(Action::from(sync), Action::Sync);
    }

    #[test]
    fn test_action_from_key_prompt_answers() {
        let grant = KeyEvent::new(KeyCode::Char('y'), KeyModifiers::NONE);
        assert_eq!(Action::from(grant), Action::Grant);

        let deny = KeyEvent::new(KeyCode::Char('n'), KeyModifiers::NONE);
        assert_eq!(Action::from(deny), Action::Deny);

        let esc = KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE);
        assert_eq!(Action::from(esc), Action::CloseDialog);
    }

    #[test]
    fn test_unmapped_key_is_none() {
        let key = KeyEvent::new(KeyCode::Char('x'), KeyModifiers::NONE);
        assert_eq!(Action::from(key), Action::None);
    }
}
