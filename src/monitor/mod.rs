//! Core monitor: log-driven lifecycle watching plus RCON status polling.
//!
//! A single cooperative select loop drives everything: tailed log lines are
//! classified against the pattern table, RCON responses are routed by their
//! registered request kind, and cancellable timers schedule version retries,
//! periodic render-stats polls and the forced session staleness reset. All
//! shared state is mutated within one loop iteration at a time.

mod stats;
mod timer;
mod version;

pub use stats::{StatsOutcome, StatsParser};
pub use timer::Timer;
pub use version::{VersionOutcome, VersionParser};

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};

use crate::config::MonitorConfig;
use crate::events::{EventBus, MonitorEvent, VersionInfo};
use crate::rcon::{RconSession, RequestKind, TaggedResponse};
use crate::watcher::{LogEvent, LogLineParser, LogTrigger, LogWatcher, PatternTable, WatcherError};

/// Interval between successful render-stats polls.
const STATS_POLL_INTERVAL: Duration = Duration::from_secs(30);
/// Backoff before retrying a failed render-stats dispatch.
const STATS_RETRY_INTERVAL: Duration = Duration::from_secs(10);
/// Delay before re-querying after a "still checking" version response.
const VERSION_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Version query attempts allowed per start cycle.
const MAX_VERSION_ATTEMPTS: u32 = 30;
/// Forced session reset interval, bounding connection staleness.
const SESSION_STALENESS_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Errors that abort the monitor.
#[derive(thiserror::Error, Debug)]
pub enum MonitorError {
    /// The log watcher could not be started or failed fatally.
    #[error("Log watcher failed: {0}")]
    Watcher(#[from] WatcherError),

    /// A static pattern failed to compile.
    #[error("Pattern failed to compile: {0}")]
    Pattern(#[from] regex::Error),
}

/// The cancellable timers driven by the monitor loop.
#[derive(Debug, Default)]
struct MonitorTimers {
    /// Re-query `version` after a transient response or dispatch failure.
    version_retry: Timer,
    /// Next render-stats poll (long interval on success, short on failure).
    stats_poll: Timer,
    /// Forced session reset; cancelled whenever the session resets early.
    session_staleness: Timer,
}

/// Observes one Minecraft server through its log file and RCON port.
///
/// Construct with [`Monitor::new`], subscribe via [`Monitor::subscribe`],
/// then drive with [`Monitor::run`]. Multiple monitors can coexist; nothing
/// is process-global.
#[derive(Debug)]
pub struct Monitor {
    log_file: PathBuf,
    session: RconSession,
    responses: Option<mpsc::UnboundedReceiver<TaggedResponse>>,
    line_parser: LogLineParser,
    patterns: PatternTable,
    version_parser: VersionParser,
    stats_parser: StatsParser,
    bus: EventBus,
    /// Whether a server start has been observed without an intervening stop.
    /// Guards `Closed` against duplicate emission.
    started: bool,
    version_attempts: u32,
    version: Option<VersionInfo>,
    /// Last emitted render target; `None` until the first successful poll.
    last_render: Option<Option<String>>,
}

impl Monitor {
    /// Create a monitor from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Pattern`] if a static pattern fails to
    /// compile.
    pub fn new(config: &MonitorConfig) -> Result<Self, MonitorError> {
        let (session, responses) =
            RconSession::new(config.host.clone(), config.port, config.password.clone());

        Ok(Self {
            log_file: config.log_file.clone(),
            session,
            responses: Some(responses),
            line_parser: LogLineParser::new()?,
            patterns: PatternTable::new()?,
            version_parser: VersionParser::new()?,
            stats_parser: StatsParser::new()?,
            bus: EventBus::new(),
            started: false,
            version_attempts: 0,
            version: None,
            last_render: None,
        })
    }

    /// Eagerly connect and log in to the RCON port.
    ///
    /// The run loop connects on demand either way; this exists so bootstrap
    /// can surface a rejected password to the operator instead of burying it
    /// in retry warnings.
    ///
    /// # Errors
    ///
    /// Propagates connection, authentication and timeout errors from the
    /// session.
    pub async fn connect(&mut self) -> Result<(), crate::rcon::RconError> {
        self.session.ensure().await
    }

    /// Subscribe to monitor events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.bus.subscribe()
    }

    /// Last resolved server version, if any.
    #[must_use]
    pub fn version(&self) -> Option<&VersionInfo> {
        self.version.as_ref()
    }

    /// Whether a server start has been observed without a stop since.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Run the monitor until the log watcher channel closes.
    ///
    /// Starts tailing the log at its current end and kicks off the periodic
    /// render-stats poll immediately.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Watcher`] if the log watcher cannot be
    /// started. RCON failures after startup are never fatal; they are
    /// converted into scheduled retries.
    pub async fn run(mut self) -> Result<(), MonitorError> {
        let Some(mut responses) = self.responses.take() else {
            return Ok(());
        };
        let (_watcher, mut log_events) = LogWatcher::new(self.log_file.clone())?;
        tracing::info!(log_file = %self.log_file.display(), "Monitor started");

        let mut timers = MonitorTimers::default();
        timers.stats_poll.arm(Duration::ZERO);

        loop {
            tokio::select! {
                event = log_events.recv() => match event {
                    Some(event) => self.handle_log_event(event, &mut timers).await,
                    None => {
                        tracing::warn!("Log watcher channel closed, stopping monitor");
                        break;
                    }
                },
                response = responses.recv() => match response {
                    Some(response) => self.handle_response(&response, &mut timers),
                    None => break,
                },
                () = timers.version_retry.fired() => self.dispatch_version(&mut timers).await,
                () = timers.stats_poll.fired() => self.poll_stats(&mut timers).await,
                () = timers.session_staleness.fired() => {
                    tracing::info!("Session staleness bound reached, forcing reset");
                    self.session.reset();
                }
            }
        }

        self.session.reset();
        Ok(())
    }

    /// Dispatch one log event from the tail.
    async fn handle_log_event(&mut self, event: LogEvent, timers: &mut MonitorTimers) {
        match event {
            LogEvent::Line(raw) => {
                let Some(line) = self.line_parser.parse(&raw) else {
                    return;
                };
                for trigger in self.patterns.matches(&line) {
                    self.handle_trigger(trigger, timers).await;
                }
            }
            LogEvent::FileDeleted(path) => {
                tracing::warn!(path = %path.display(), "Log file disappeared");
            }
            LogEvent::Error(e) => {
                tracing::warn!(error = %e, "Log watcher error");
            }
        }
    }

    /// React to a lifecycle transition detected in the log.
    async fn handle_trigger(&mut self, trigger: LogTrigger, timers: &mut MonitorTimers) {
        match trigger {
            LogTrigger::ServerStopping => {
                tracing::info!("Server stop detected");
                timers.session_staleness.cancel();
                timers.version_retry.cancel();
                self.version_attempts = 0;
                self.session.reset();

                if self.started {
                    self.started = false;
                    self.bus.emit(MonitorEvent::Closed);
                }
            }
            LogTrigger::ServerStarted => {
                tracing::info!("Server start detected");
                self.started = true;
                self.version_attempts = 0;
                self.dispatch_version(timers).await;
            }
        }
    }

    /// Route one tagged RCON response.
    fn handle_response(&mut self, response: &TaggedResponse, timers: &mut MonitorTimers) {
        match response.kind {
            RequestKind::Version => self.handle_version_response(&response.body, timers),
            RequestKind::RenderStats => self.handle_stats_response(&response.body, timers),
        }
    }

    /// Issue a `version` query, retrying shortly on dispatch failure.
    async fn dispatch_version(&mut self, timers: &mut MonitorTimers) {
        if !self.started {
            // A stop may have landed while the retry timer was pending.
            return;
        }
        if self.version_attempts >= MAX_VERSION_ATTEMPTS {
            tracing::warn!(
                attempts = self.version_attempts,
                "Giving up on version query for this start cycle"
            );
            return;
        }
        self.version_attempts += 1;

        match self.session.run("version", RequestKind::Version).await {
            Ok(id) => {
                tracing::debug!(id, "Version query dispatched");
                self.arm_staleness(timers);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Version query failed, retrying");
                // The session was reset on failure; its staleness deadline
                // must not carry over to the next connection.
                timers.session_staleness.cancel();
                timers.version_retry.arm(VERSION_RETRY_DELAY);
            }
        }
    }

    /// Handle a `version` response.
    fn handle_version_response(&mut self, body: &str, timers: &mut MonitorTimers) {
        if !self.started {
            // A stop may have landed while the response sat in the channel.
            return;
        }
        match self.version_parser.parse(body) {
            VersionOutcome::Running(info) => {
                timers.version_retry.cancel();
                self.version_attempts = 0;
                tracing::info!(
                    software = %info.server_software,
                    mc = %info.mc_version,
                    "Server version resolved"
                );
                self.version = Some(info.clone());
                self.bus.emit(MonitorEvent::Wakeup(info));
            }
            VersionOutcome::Checking => {
                if self.version_attempts >= MAX_VERSION_ATTEMPTS {
                    tracing::warn!(
                        attempts = self.version_attempts,
                        "Version still checking, retry budget exhausted"
                    );
                } else {
                    tracing::debug!("Server still checking version, retrying shortly");
                    timers.version_retry.arm(VERSION_RETRY_DELAY);
                }
            }
            VersionOutcome::Unrecognized => {
                tracing::debug!("Unrecognized version response skipped");
            }
        }
    }

    /// Issue a render-stats query; backoff shorter on dispatch failure.
    async fn poll_stats(&mut self, timers: &mut MonitorTimers) {
        match self
            .session
            .run("dynmap stats", RequestKind::RenderStats)
            .await
        {
            Ok(id) => {
                tracing::trace!(id, "Render stats query dispatched");
                self.arm_staleness(timers);
                // Watchdog in case the response never arrives; the response
                // handler re-arms with the same interval on arrival.
                timers.stats_poll.arm(STATS_POLL_INTERVAL);
            }
            Err(e) => {
                tracing::debug!(error = %e, "Render stats query failed, backing off");
                timers.session_staleness.cancel();
                timers.stats_poll.arm(STATS_RETRY_INTERVAL);
            }
        }
    }

    /// Handle a render-stats response, emitting only on change.
    fn handle_stats_response(&mut self, body: &str, timers: &mut MonitorTimers) {
        if let StatsOutcome::ActiveJobs(target) = self.stats_parser.parse(body) {
            if self.last_render.as_ref() != Some(&target) {
                tracing::info!(world = ?target, "Active render job changed");
                self.bus.emit(MonitorEvent::Rendered(target.clone()));
                self.last_render = Some(target);
            }
        }
        timers.stats_poll.arm(STATS_POLL_INTERVAL);
    }

    /// Arm the staleness reset once per connection.
    fn arm_staleness(&self, timers: &mut MonitorTimers) {
        if self.session.is_connected() && !timers.session_staleness.is_armed() {
            timers.session_staleness.arm(SESSION_STALENESS_INTERVAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    fn test_config(port: u16) -> MonitorConfig {
        MonitorConfig {
            host: "127.0.0.1".to_string(),
            port,
            password: "secret".to_string(),
            log_file: PathBuf::from("/tmp/latest.log"),
        }
    }

    fn test_monitor() -> Monitor {
        Monitor::new(&test_config(25575)).unwrap()
    }

    async fn closed_port() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    #[tokio::test]
    async fn test_stop_emits_closed_exactly_once() {
        let mut monitor = test_monitor();
        let mut rx = monitor.subscribe();
        let mut timers = MonitorTimers::default();
        monitor.started = true;

        monitor
            .handle_trigger(LogTrigger::ServerStopping, &mut timers)
            .await;
        assert_eq!(rx.try_recv().unwrap(), MonitorEvent::Closed);
        assert!(!monitor.is_started());

        // Second consecutive stop fires nothing.
        monitor
            .handle_trigger(LogTrigger::ServerStopping, &mut timers)
            .await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_stop_without_start_emits_nothing() {
        let mut monitor = test_monitor();
        let mut rx = monitor.subscribe();
        let mut timers = MonitorTimers::default();

        monitor
            .handle_trigger(LogTrigger::ServerStopping, &mut timers)
            .await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_stop_cancels_timers_and_resets_session() {
        let mut monitor = test_monitor();
        let mut timers = MonitorTimers::default();
        monitor.started = true;
        timers.session_staleness.arm(SESSION_STALENESS_INTERVAL);
        timers.version_retry.arm(VERSION_RETRY_DELAY);

        monitor
            .handle_trigger(LogTrigger::ServerStopping, &mut timers)
            .await;

        assert!(!timers.session_staleness.is_armed());
        assert!(!timers.version_retry.is_armed());
        assert_eq!(monitor.session.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_start_line_marks_started_and_queries_version() {
        // Unreachable port: the dispatch fails and schedules a retry, which
        // still proves the version poll was kicked off.
        let mut monitor = Monitor::new(&test_config(closed_port().await)).unwrap();
        let mut timers = MonitorTimers::default();

        monitor
            .handle_log_event(
                LogEvent::Line(
                    "[12:00:00] [Server thread/INFO]: RCON running on 0.0.0.0:25575".to_string(),
                ),
                &mut timers,
            )
            .await;

        assert!(monitor.is_started());
        assert_eq!(monitor.version_attempts, 1);
        assert!(timers.version_retry.is_armed());
    }

    #[tokio::test]
    async fn test_non_matching_lines_change_nothing() {
        let mut monitor = test_monitor();
        let mut rx = monitor.subscribe();
        let mut timers = MonitorTimers::default();

        monitor
            .handle_log_event(LogEvent::Line("arbitrary log noise".to_string()), &mut timers)
            .await;
        monitor
            .handle_log_event(
                LogEvent::Line("[12:00:00] [Server thread/INFO]: Some chatter".to_string()),
                &mut timers,
            )
            .await;

        assert!(!monitor.is_started());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_checking_response_schedules_one_retry_without_wakeup() {
        let mut monitor = test_monitor();
        let mut rx = monitor.subscribe();
        let mut timers = MonitorTimers::default();
        monitor.started = true;
        monitor.version_attempts = 1;

        monitor.handle_version_response("Checking version, please wait...", &mut timers);

        assert!(timers.version_retry.is_armed());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_checking_response_respects_retry_budget() {
        let mut monitor = test_monitor();
        let mut timers = MonitorTimers::default();
        monitor.started = true;
        monitor.version_attempts = MAX_VERSION_ATTEMPTS;

        monitor.handle_version_response("Checking version, please wait...", &mut timers);
        assert!(!timers.version_retry.is_armed());
    }

    #[tokio::test]
    async fn test_terminal_version_emits_wakeup() {
        let mut monitor = test_monitor();
        let mut rx = monitor.subscribe();
        let mut timers = MonitorTimers::default();
        monitor.started = true;
        timers.version_retry.arm(VERSION_RETRY_DELAY);

        monitor.handle_version_response(
            "This server is running Paper version git-Paper-123 (MC: 1.20.1)",
            &mut timers,
        );

        let expected = VersionInfo {
            server_software: "Paper version git-Paper-123".to_string(),
            mc_version: "1.20.1".to_string(),
        };
        assert_eq!(rx.try_recv().unwrap(), MonitorEvent::Wakeup(expected.clone()));
        assert_eq!(monitor.version(), Some(&expected));
        assert!(!timers.version_retry.is_armed());
    }

    #[tokio::test]
    async fn test_version_response_after_stop_emits_nothing() {
        // A terminal response can sit in the channel while the stop line is
        // processed; it must not announce a wakeup for a stopped server.
        let mut monitor = test_monitor();
        let mut rx = monitor.subscribe();
        let mut timers = MonitorTimers::default();
        monitor.started = true;

        monitor
            .handle_trigger(LogTrigger::ServerStopping, &mut timers)
            .await;
        assert_eq!(rx.try_recv().unwrap(), MonitorEvent::Closed);

        monitor.handle_version_response(
            "This server is running Paper version git-Paper-123 (MC: 1.20.1)",
            &mut timers,
        );

        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert!(monitor.version().is_none());
        assert!(!timers.version_retry.is_armed());
    }

    #[tokio::test]
    async fn test_rendered_fires_only_on_change() {
        let mut monitor = test_monitor();
        let mut rx = monitor.subscribe();
        let mut timers = MonitorTimers::default();

        let block = |jobs: &str| {
            format!("Tile Render Statistics:\n  processed=10\nActive render jobs: {jobs}\n")
        };

        // First poll always emits.
        monitor.handle_stats_response(&block("overworld"), &mut timers);
        assert_eq!(
            rx.try_recv().unwrap(),
            MonitorEvent::Rendered(Some("overworld".to_string()))
        );

        // Identical value emits nothing.
        monitor.handle_stats_response(&block("overworld"), &mut timers);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        // Transition to the no-job sentinel emits.
        monitor.handle_stats_response(&block("none"), &mut timers);
        assert_eq!(rx.try_recv().unwrap(), MonitorEvent::Rendered(None));

        // Sentinel repeated emits nothing.
        monitor.handle_stats_response(&block(""), &mut timers);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_stats_response_always_reschedules_poll() {
        let mut monitor = test_monitor();
        let mut timers = MonitorTimers::default();

        monitor.handle_stats_response("Unknown command", &mut timers);
        assert!(timers.stats_poll.is_armed());
    }

    #[tokio::test]
    async fn test_failed_stats_dispatch_backs_off() {
        let mut monitor = Monitor::new(&test_config(closed_port().await)).unwrap();
        let mut timers = MonitorTimers::default();
        timers.session_staleness.arm(SESSION_STALENESS_INTERVAL);

        monitor.poll_stats(&mut timers).await;
        assert!(timers.stats_poll.is_armed());
        // The failed dispatch reset the session, so its staleness deadline
        // must be gone too.
        assert!(!timers.session_staleness.is_armed());
    }

    #[tokio::test]
    async fn test_version_dispatch_skipped_after_stop() {
        // Simulates the retry timer firing after a stop already landed.
        let mut monitor = test_monitor();
        let mut timers = MonitorTimers::default();
        monitor.started = false;

        monitor.dispatch_version(&mut timers).await;
        assert_eq!(monitor.version_attempts, 0);
        assert!(!timers.version_retry.is_armed());
    }
}
