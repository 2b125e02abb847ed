//! Peer networking
//!
//! [`transport`] defines the channel abstraction, with TCP and in-process
//! implementations. [`session`] and [`reducer`] hold the pure match state
//! machine; [`game_session`] drives it against a live transport.

pub mod connection;
pub mod framing;
pub mod game_session;
pub mod memory;
pub mod protocol;
pub mod reducer;
pub mod session;
pub mod tcp;
pub mod timers;
pub mod transport;
