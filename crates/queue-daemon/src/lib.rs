//! Queue coordinator daemon.
//!
//! Owns the ticket store, arbitrates every state transition and fans changes
//! out to connected viewers over the TCP socket and the HTTP API.

pub mod coordinator;
pub mod http;
pub mod logging;
pub mod notifier;
pub mod printer;
pub mod sequencer;
pub mod socket;
pub mod store;
