/// Player constants
pub mod player {
    /// Health every player spawns and respawns with
    pub const MAX_HEALTH: i32 = 100;
    /// Damage assumed when a `playerHit` omits its damage field
    pub const DEFAULT_HIT_DAMAGE: i32 = 20;
    /// Local movement speed in world units per second
    pub const MOVE_SPEED: f32 = 9.0;
    /// Maximum players per session (humans and bots)
    pub const MAX_PLAYERS: usize = 10;
}

/// Spawn area constants
pub mod spawn {
    /// Half-extent of the square a joining client picks its first position in
    pub const JOIN_HALF_EXTENT: f32 = 10.0;
    /// Half-extent of the square used for match start and respawn positions
    pub const ARENA_HALF_EXTENT: f32 = 20.0;
}

/// Timing constants (milliseconds)
pub mod timing {
    /// Delay between elimination and respawn, for humans and bots alike
    pub const RESPAWN_DELAY_MS: u64 = 3000;
    /// Delay between broadcasting `gameEnded` and tearing the host session down
    pub const SHUTDOWN_DELAY_MS: u64 = 2000;
    /// Delay before the single signaling reconnect attempt
    pub const SIGNALING_RECONNECT_MS: u64 = 1000;
    /// Simulation tick (bot movement, remote interpolation)
    pub const TICK_MS: u64 = 50;
}

/// Matchmaking constants
pub mod matchmaking {
    /// Per-candidate join attempt bound (seconds)
    pub const JOIN_TIMEOUT_SECS: u64 = 5;
    /// Directory records older than this are ignored (seconds)
    pub const LOBBY_FRESHNESS_SECS: i64 = 120;
    /// Re-registration interval while public (seconds)
    pub const HEARTBEAT_SECS: u64 = 20;
    /// Bots seeded into a freshly created public session
    pub const PUBLIC_BOTS: usize = 3;
    /// Auto-start delay for a public session (seconds)
    pub const PUBLIC_AUTOSTART_SECS: u64 = 15;
    /// Bots seeded into an offline session
    pub const OFFLINE_BOTS: usize = 5;
    /// Auto-start delay for an offline session (seconds)
    pub const OFFLINE_AUTOSTART_SECS: u64 = 3;
}

/// Directory server constants
pub mod directory {
    /// Server-side pruning age for lobby records (seconds)
    pub const LOBBY_TTL_SECS: u64 = 30 * 60;
    /// Default `playerCount` when a registration omits it
    pub const DEFAULT_PLAYER_COUNT: u32 = 1;
    /// Default `maxPlayers` when a registration omits it
    pub const DEFAULT_MAX_PLAYERS: u32 = 10;
    /// Largest request the directory will read
    pub const MAX_REQUEST_SIZE: usize = 16 * 1024;
}

/// AI bot constants
pub mod ai {
    /// Time between AI decision updates (milliseconds)
    pub const DECISION_INTERVAL_MS: u64 = 500;
    /// Distance at which a bot switches from roaming to combat
    pub const AGGRO_RADIUS: f32 = 30.0;
    /// Distance at which a bot in combat opens fire
    pub const FIRE_RANGE: f32 = 20.0;
    /// Minimum time between bot shots (milliseconds)
    pub const FIRE_COOLDOWN_MS: u64 = 800;
    /// Probability that a bot shot connects
    pub const HIT_CHANCE: f64 = 0.7;
    /// Damage per connecting bot shot (pistol-equivalent)
    pub const DAMAGE: i32 = 15;
    /// Combat advance speed (units per second)
    pub const COMBAT_SPEED: f32 = 4.5;
    /// Roaming speed (units per second)
    pub const ROAM_SPEED: f32 = 2.0;
    /// Chance per decision to pick a fresh roam waypoint
    pub const WAYPOINT_CHANCE: f64 = 0.2;
    /// Maximum waypoint offset from the bot's current position
    pub const WAYPOINT_RADIUS: f32 = 10.0;
    /// Bots stop advancing once this close to their combat target
    pub const STANDOFF_DISTANCE: f32 = 6.0;
    /// Minimum interval between `playerMove` broadcasts per bot (milliseconds)
    pub const MOVE_BROADCAST_MS: u64 = 100;
}

/// Interpolation of remote entities toward their last reported transform
pub mod interpolation {
    /// Fraction of the remaining distance covered each tick
    pub const FACTOR: f32 = 0.2;
    /// Constant offset added to the remaining distance before lerping.
    /// Carried over from the browser client unchanged; see DESIGN.md.
    pub const BIAS: f32 = 0.5;
}

/// Building constants
pub mod building {
    /// Materials every session starts with
    pub const STARTING_MATERIALS: u32 = 100;
    pub const WALL_COST: u32 = 10;
    pub const FLOOR_COST: u32 = 10;
    pub const RAMP_COST: u32 = 15;
}

/// Networking constants
pub mod net {
    /// Maximum frame payload on the TCP transport
    pub const MAX_MESSAGE_SIZE: usize = 65536;
}
