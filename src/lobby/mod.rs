//! Lobby discovery and matchmaking
//!
//! The directory is a short-lived listing of public hosts. Hosts refresh
//! their entry on a heartbeat; players read it once per "Play" press and
//! walk the listing until a join succeeds.

pub mod directory;
pub mod matchmaking;
pub mod server;
pub mod store;
