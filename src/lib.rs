//! craftmon - Minecraft server lifecycle monitor.
//!
//! Watches a server it does not control through two channels: tailing its
//! append-only log for lifecycle transitions, and an authenticated RCON
//! session for status queries. Derived events (`Wakeup`, `Closed`,
//! `Rendered`) are raised on a typed bus for an external notifier.

pub mod config;
pub mod events;
pub mod monitor;
pub mod rcon;
pub mod watcher;
