//! Interactive terminal UI
//!
//! The default front end: a status display, the held device's details, the
//! last sync result, and two actions — detect and sync — plus the
//! permission prompt dialog.

mod app;
mod events;
mod ui;

use anyhow::Result;
use app::App;
use common::UsbBridge;
use crossterm::{
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use events::{Action, Event, EventHandler};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::io::{self, Stdout};
use std::time::Duration;
use tokio::sync::mpsc;

/// Run the TUI until the user quits
pub async fn run(usb_bridge: UsbBridge) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, usb_bridge).await;

    // Restore the terminal even when the app loop errored
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    usb_bridge: UsbBridge,
) -> Result<()> {
    let (sync_tx, mut sync_rx) = mpsc::unbounded_channel();
    let bridge = usb_bridge.clone();
    let mut app = App::new(usb_bridge, sync_tx);
    let mut events = EventHandler::new(Duration::from_millis(250));

    // Startup detection pass, so an already-plugged device shows up
    // without waiting for an attach notification.
    app.handle_action(Action::Detect).await?;

    loop {
        terminal.draw(|frame| ui::render(frame, &app))?;

        tokio::select! {
            maybe_event = events.next() => match maybe_event {
                Some(Event::Key(key)) => app.handle_action(Action::from(key)).await?,
                Some(Event::Resize(_, _)) | Some(Event::Tick) => {}
                None => break,
            },
            usb_event = bridge.recv_event() => match usb_event {
                Ok(event) => app.handle_usb_event(event).await?,
                Err(_) => break,
            },
            Some(result) = sync_rx.recv() => app.apply_sync_result(result),
        }

        if app.should_quit() {
            break;
        }
    }

    Ok(())
}
