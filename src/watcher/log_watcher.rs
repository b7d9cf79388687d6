//! Log watcher with notify integration.
//!
//! Watches the server log file for growth and emits new lines over a tokio
//! channel, in file order.

use std::path::PathBuf;
use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::Duration;

use notify_debouncer_full::{
    new_debouncer,
    notify::{self, RecursiveMode},
    DebounceEventResult,
};
use tokio::sync::mpsc;

use super::error::WatcherError;
use super::tailer::LogTailer;

/// Events emitted by the log watcher.
#[derive(Debug)]
pub enum LogEvent {
    /// A new complete line was appended to the log.
    Line(String),
    /// The watched file disappeared (deleted or rotated away).
    FileDeleted(PathBuf),
    /// An error occurred during watching.
    Error(WatcherError),
}

/// Watches a single log file and streams appended lines.
///
/// Uses notify-debouncer-full for file system events and bridges them to a
/// tokio mpsc channel. Lines already present when the watcher starts are not
/// reported; only new growth is.
pub struct LogWatcher {
    /// The file being watched.
    watch_path: PathBuf,
    /// Dropping this stops the bridge thread.
    #[allow(dead_code)]
    stop_tx: std_mpsc::Sender<()>,
    /// Handle to the bridge thread.
    #[allow(dead_code)]
    bridge_handle: thread::JoinHandle<()>,
}

impl LogWatcher {
    /// Create a new watcher for the given log file.
    ///
    /// Returns the watcher and a receiver for log events.
    ///
    /// # Errors
    ///
    /// Returns an error if the file watcher cannot be created or the parent
    /// directory cannot be watched.
    pub fn new(
        watch_path: PathBuf,
    ) -> Result<(Self, mpsc::UnboundedReceiver<LogEvent>), WatcherError> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = std_mpsc::channel();
        let (notify_tx, notify_rx) = std_mpsc::channel();

        let mut debouncer = new_debouncer(Duration::from_millis(100), None, move |result| {
            let _ = notify_tx.send(result);
        })?;

        // Watch the containing directory so rotation/recreation is seen too.
        let watch_target = watch_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(&watch_path)
            .to_path_buf();
        debouncer.watch(&watch_target, RecursiveMode::NonRecursive)?;

        let tailer = LogTailer::from_end(watch_path.clone());
        let watch_path_clone = watch_path.clone();

        // Bridge thread: converts std_mpsc notify events to tokio mpsc.
        let bridge_handle = thread::spawn(move || {
            let mut tailer = tailer;
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    let _ = event_tx.send(LogEvent::Error(WatcherError::Io(e)));
                    return;
                }
            };

            loop {
                match stop_rx.try_recv() {
                    // A dropped sender stops the thread too.
                    Ok(()) | Err(std_mpsc::TryRecvError::Disconnected) => break,
                    Err(std_mpsc::TryRecvError::Empty) => {}
                }

                match notify_rx.recv_timeout(Duration::from_millis(100)) {
                    Ok(result) => {
                        Self::handle_debounce_result(
                            result,
                            &watch_path_clone,
                            &mut tailer,
                            &event_tx,
                            &runtime,
                        );
                    }
                    Err(std_mpsc::RecvTimeoutError::Timeout) => {}
                    Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
                }
            }

            // Keep debouncer alive until thread exits.
            drop(debouncer);
        });

        Ok((
            Self {
                watch_path,
                stop_tx,
                bridge_handle,
            },
            event_rx,
        ))
    }

    /// Handle a debounce result from notify.
    fn handle_debounce_result(
        result: DebounceEventResult,
        watch_path: &PathBuf,
        tailer: &mut LogTailer,
        event_tx: &mpsc::UnboundedSender<LogEvent>,
        runtime: &tokio::runtime::Runtime,
    ) {
        match result {
            Ok(events) => {
                for event in &events {
                    Self::handle_notify_event(event, watch_path, tailer, event_tx, runtime);
                }
            }
            Err(errors) => {
                for error in errors {
                    let _ = event_tx.send(LogEvent::Error(WatcherError::Notify(error)));
                }
            }
        }
    }

    /// Handle a single notify event.
    fn handle_notify_event(
        event: &notify_debouncer_full::DebouncedEvent,
        watch_path: &PathBuf,
        tailer: &mut LogTailer,
        event_tx: &mpsc::UnboundedSender<LogEvent>,
        runtime: &tokio::runtime::Runtime,
    ) {
        use notify::EventKind;

        if !event.paths.iter().any(|p| p == watch_path) {
            return;
        }

        match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) => {
                match runtime.block_on(tailer.read_new_lines()) {
                    Ok(lines) => {
                        for line in lines {
                            let _ = event_tx.send(LogEvent::Line(line));
                        }
                    }
                    Err(WatcherError::FileDeleted(path)) => {
                        let _ = event_tx.send(LogEvent::FileDeleted(path));
                    }
                    Err(e) => {
                        let _ = event_tx.send(LogEvent::Error(e));
                    }
                }
            }
            EventKind::Remove(_) => {
                tailer.reset();
                let _ = event_tx.send(LogEvent::FileDeleted(watch_path.clone()));
            }
            _ => {}
        }
    }

    /// Get the path being watched.
    #[must_use]
    pub fn watch_path(&self) -> &PathBuf {
        &self.watch_path
    }
}
