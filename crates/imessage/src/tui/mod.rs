//! Interactive terminal interface.
//!
//! The render loop is the only reader of [`App`]. Session work runs in
//! background tasks and reaches the screen through the update queue; key
//! events come from a blocking reader on its own thread.

mod app;
mod ui;

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use imessage_core::session::{self, UpdateReceiver};
use imessage_core::{
    AppleScriptSender, ChangeDetector, ChatDb, Config, ContactResolver, MessageSender,
    MessageStore, SessionController, SingleInstanceLock, Status,
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use app::{Action, App};

const INPUT_POLL: Duration = Duration::from_millis(100);
const REDRAW_INTERVAL: Duration = Duration::from_secs(1);

type Term = Terminal<CrosstermBackend<io::Stdout>>;

/// Runs the terminal interface until the user quits.
pub async fn run(config: &Config) -> Result<()> {
    let _lock = SingleInstanceLock::acquire(config.lock_path.clone())
        .context("Could not start the terminal interface")?;

    let contacts = Arc::new(ContactResolver::discover());
    let store = Arc::new(ChatDb::new(config.database_path.clone(), contacts));
    let sender = Arc::new(AppleScriptSender::new().with_timeout(config.send_timeout()));
    let (updates, mut receiver) = session::channel();
    let session = SessionController::new(
        Arc::clone(&store),
        sender,
        config.session(),
        updates.clone(),
    );

    if let Err(err) = session.load_initial().await {
        warn!(error = %err, "Initial load failed");
        updates.status(Status::from_error(&err));
    }

    let detector = ChangeDetector::new(store, config.detector());
    session.attach(&detector);
    detector.start().await;

    let (result, restored) = match setup_terminal() {
        Ok(mut terminal) => {
            let result = event_loop(&mut terminal, &session, &mut receiver).await;
            (result, restore_terminal(&mut terminal))
        }
        Err(err) => (Err(err), Ok(())),
    };

    shutdown(&detector, result, restored).await
}

/// Stops the detector before reporting the loop's error, then the
/// terminal restore error.
async fn shutdown<S: MessageStore>(
    detector: &ChangeDetector<S>,
    result: Result<()>,
    restored: Result<()>,
) -> Result<()> {
    detector.stop().await;
    info!("Terminal interface closed");
    result.and(restored)
}

fn setup_terminal() -> Result<Term> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Term) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Forwards terminal events until `stop` is set or the receiver is gone.
fn spawn_input(
    stop: Arc<AtomicBool>,
) -> (
    mpsc::UnboundedReceiver<Event>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let reader = tokio::task::spawn_blocking(move || {
        while !stop.load(Ordering::Relaxed) {
            match event::poll(INPUT_POLL) {
                Ok(true) => match event::read() {
                    Ok(event) => {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "Terminal read failed");
                        break;
                    }
                },
                Ok(false) => {}
                Err(err) => {
                    warn!(error = %err, "Terminal poll failed");
                    break;
                }
            }
        }
    });
    (rx, reader)
}

async fn event_loop<S: MessageStore, M: MessageSender>(
    terminal: &mut Term,
    session: &SessionController<S, M>,
    updates: &mut UpdateReceiver,
) -> Result<()> {
    let mut app = App::new();
    for update in updates.drain() {
        app.apply(update);
    }

    let stop = Arc::new(AtomicBool::new(false));
    let (mut input, reader) = spawn_input(Arc::clone(&stop));
    let mut redraw = tokio::time::interval(REDRAW_INTERVAL);

    let result = loop {
        if let Err(err) = terminal.draw(|f| ui::render(f, &mut app)) {
            break Err(err.into());
        }

        tokio::select! {
            Some(update) = updates.recv() => {
                app.apply(update);
                for update in updates.drain() {
                    app.apply(update);
                }
            }
            event = input.recv() => match event {
                Some(Event::Key(key)) if key.kind != KeyEventKind::Release => {
                    if let Some(action) = app.handle_key(key) {
                        perform(session, &mut app, action);
                    }
                }
                Some(_) => {}
                None => break Err(anyhow!("Terminal input closed")),
            },
            _ = redraw.tick() => {}
        }

        if app.should_quit() {
            break Ok(());
        }
    };

    stop.store(true, Ordering::Relaxed);
    if let Err(err) = reader.await {
        debug!(error = %err, "Input reader ended abnormally");
    }
    result
}

fn perform<S: MessageStore, M: MessageSender>(
    session: &SessionController<S, M>,
    app: &mut App,
    action: Action,
) {
    match action {
        Action::Select(chat_id) => {
            drop(session.select_conversation(chat_id));
        }
        Action::Send(text) => {
            if let Err(err) = session.send_message(text.clone()) {
                debug!(error = %err, "Send refused");
                app.reject_send(text, Status::from_error(&err));
            }
        }
        Action::Refresh => {
            if session.refresh().is_none() {
                debug!("Refresh already running");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use imessage_core::{DetectorConfig, MemoryStore};

    #[tokio::test]
    async fn test_shutdown_stops_detector_when_restore_fails() {
        let store = Arc::new(MemoryStore::new());
        let detector = ChangeDetector::new(store, DetectorConfig::default());
        detector.start().await;
        assert!(detector.is_running().await);

        let err = shutdown(&detector, Ok(()), Err(anyhow!("terminal gone")))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "terminal gone");
        assert!(!detector.is_running().await);
    }

    #[tokio::test]
    async fn test_shutdown_reports_loop_error_first() {
        let store = Arc::new(MemoryStore::new());
        let detector = ChangeDetector::new(store, DetectorConfig::default());
        detector.start().await;

        let loop_err = Err(anyhow!("input closed"));
        let err = shutdown(&detector, loop_err, Err(anyhow!("terminal gone")))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "input closed");
        assert!(!detector.is_running().await);
    }
}
