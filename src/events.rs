//! Event channels: completions of backend work for the tree, and terminal
//! input for the host.
//!
//! [`EventHandler`] spawns an OS thread (not tokio task) because `crossterm::event::poll()`
//! blocks and would starve the async runtime. Drop signals shutdown without joining
//! to avoid deadlocking if `poll` blocks during panic unwinding.

use crate::arena::Generation;
use crate::error::TreeError;
use crate::model::{Node, NodeId};
use crate::mutation::{Mutation, Resolved};
use crossterm::event::{self, Event as CrosstermEvent, KeyEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinError;

/// Completion of one spawned backend operation. Each spawned operation
/// sends exactly one of these, cancelled ones included.
#[derive(Debug)]
pub enum TreeEvent {
    Root {
        id: NodeId,
        ticket: Generation,
        result: Result<Node, TreeError>,
    },
    Children {
        parent: NodeId,
        ticket: Generation,
        result: Result<Vec<Node>, TreeError>,
    },
    Mutation {
        mutation: Mutation,
        result: Result<Resolved, TreeError>,
    },
}

/// Describes a spawned task that ended without producing its result.
pub fn join_failure(err: JoinError) -> String {
    if !err.is_panic() {
        return "task cancelled".to_string();
    }
    match err.into_panic().downcast::<String>() {
        Ok(s) => format!("task panicked: {s}"),
        Err(payload) => match payload.downcast::<&str>() {
            Ok(s) => format!("task panicked: {s}"),
            Err(_) => "task panicked".to_string(),
        },
    }
}

#[derive(Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Tick,
    Resize,
    /// Global toast, auto-dismisses after `ERROR_TTL_SECS`.
    Error(String),
}

pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<AppEvent>,
    tx: mpsc::UnboundedSender<AppEvent>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl EventHandler {
    pub fn new(tick_rate: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let event_tx = tx.clone();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = shutdown.clone();

        let thread = std::thread::spawn(move || {
            while !shutdown_flag.load(Ordering::Relaxed) {
                match event::poll(tick_rate) {
                    Err(e) => {
                        let _ = event_tx.send(AppEvent::Error(format!("Terminal poll error: {e}")));
                        break;
                    }
                    Ok(false) => {
                        if event_tx.send(AppEvent::Tick).is_err() {
                            break;
                        }
                        continue;
                    }
                    Ok(true) => {}
                }
                let sent = match event::read() {
                    Ok(CrosstermEvent::Key(key)) => event_tx.send(AppEvent::Key(key)),
                    Ok(CrosstermEvent::Resize(..)) => event_tx.send(AppEvent::Resize),
                    // EINTR: retry silently
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(()),
                    Err(e) => {
                        let _ = event_tx.send(AppEvent::Error(format!("Terminal read error: {e}")));
                        break;
                    }
                    Ok(_) => Ok(()),
                };
                if sent.is_err() {
                    break;
                }
            }
        });

        Self {
            rx,
            tx,
            shutdown,
            thread: Some(thread),
        }
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<AppEvent> {
        self.tx.clone()
    }

    pub async fn next(&mut self) -> Option<AppEvent> {
        self.rx.recv().await
    }

    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                tracing::error!("terminal event thread panicked");
            }
        }
    }
}

impl Drop for EventHandler {
    fn drop(&mut self) {
        // Signal only. The thread exits on its next poll tick.
        self.shutdown.store(true, Ordering::Relaxed);
    }
}
