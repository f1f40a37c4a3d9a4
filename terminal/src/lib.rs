pub mod client;
pub mod config;
pub mod connection;
pub mod errors;
pub mod history;
pub mod listener;
pub mod models;
pub mod terminal_state;
pub mod utils;

pub use client::TerminalClient;
pub use connection::{ConnectionOptions, SynchronizationMode, SynchronizationState, TerminalConnection};
pub use errors::{Result, TerminalError};
pub use history::{HistoryStorage, MemoryHistoryStorage};
pub use listener::{ReconnectListener, SynchronizationListener};
pub use terminal_state::TerminalState;

#[cfg(test)]
mod fixtures;
#[cfg(test)]
mod mock_server;

#[cfg(test)]
mod terminal_state_test;
