//! Peer Royale
//!
//! Peer-hosted multiplayer arena shooter. One player's process is the
//! authoritative host for a match; everyone else is a client of that host.
//! A small HTTP lobby directory lets players find public matches.
//!
//! - [`net`] - peer transports, the session reducer and its runtime
//! - [`lobby`] - directory service, directory client, matchmaking
//! - [`game`] - roster, lifecycle, weapons and bot simulation
//! - [`render`] - rendering seam driven by session effects

pub mod config;
pub mod util;
pub mod game;
pub mod net;
pub mod metrics;
pub mod lobby;
pub mod render;
