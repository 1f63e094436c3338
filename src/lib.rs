//! RWT Supervisor - process supervision core for the PDANet+ reverse-WiFi-tether
//! tunnel.
//!
//! Launches the tunnel script in its own process group, forwards its merged
//! output and its log file through a noise filter, and stops it with an
//! escalating SIGINT, SIGTERM, SIGKILL protocol. Everything is reported to the
//! consumer through an [`events::EventSink`].

#[cfg(not(unix))]
compile_error!("rwt-supervisor relies on Unix process groups and signals");

pub mod config;
pub mod display;
pub mod events;
pub mod filter;
pub mod process;
pub mod supervisor;
pub mod watcher;
