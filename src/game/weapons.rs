//! Weapon table and the local player's loadout
//!
//! Weapons only matter to the shooter: the loadout gates fire rate, ammo and
//! reloads, and the chosen weapon rides along on `playerShoot` so remote
//! peers can draw the right trail.

use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WeaponKind {
    Pistol,
    #[default]
    Rifle,
    Sniper,
}

/// Static weapon stats
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeaponStats {
    pub name: &'static str,
    pub damage: i32,
    pub fire_interval: Duration,
    pub max_ammo: u32,
    pub reload_time: Duration,
    pub range: f32,
    /// Trail color as 0xRRGGBB
    pub color: u32,
    pub trail_width: f32,
}

impl WeaponKind {
    pub fn stats(self) -> WeaponStats {
        match self {
            WeaponKind::Pistol => WeaponStats {
                name: "Pistol",
                damage: 15,
                fire_interval: Duration::from_millis(400),
                max_ammo: 12,
                reload_time: Duration::from_millis(1500),
                range: 50.0,
                color: 0xffff00,
                trail_width: 1.0,
            },
            WeaponKind::Rifle => WeaponStats {
                name: "Assault Rifle",
                damage: 25,
                fire_interval: Duration::from_millis(150),
                max_ammo: 30,
                reload_time: Duration::from_millis(2000),
                range: 100.0,
                color: 0xff6600,
                trail_width: 1.5,
            },
            WeaponKind::Sniper => WeaponStats {
                name: "Sniper",
                damage: 75,
                fire_interval: Duration::from_millis(1200),
                max_ammo: 5,
                reload_time: Duration::from_millis(2500),
                range: 200.0,
                color: 0x00ffff,
                trail_width: 2.0,
            },
        }
    }
}

/// Why a trigger pull did not produce a shot
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FireBlocked {
    #[error("Weapon is cooling down")]
    Cooldown,
    #[error("Weapon is reloading")]
    Reloading,
    #[error("Out of ammo")]
    Empty,
    #[error("Player is eliminated")]
    Eliminated,
}

/// The local player's weapon state
#[derive(Debug, Clone)]
pub struct Loadout {
    current: WeaponKind,
    ammo: u32,
    reload_done_at: Option<Instant>,
    last_shot: Option<Instant>,
}

impl Loadout {
    pub fn new(kind: WeaponKind) -> Self {
        Self {
            current: kind,
            ammo: kind.stats().max_ammo,
            reload_done_at: None,
            last_shot: None,
        }
    }

    pub fn current(&self) -> WeaponKind {
        self.current
    }

    pub fn ammo(&self) -> u32 {
        self.ammo
    }

    pub fn is_reloading(&self, now: Instant) -> bool {
        matches!(self.reload_done_at, Some(done) if now < done)
    }

    /// Finish a reload whose timer has elapsed
    fn settle(&mut self, now: Instant) {
        if let Some(done) = self.reload_done_at {
            if now >= done {
                self.ammo = self.current.stats().max_ammo;
                self.reload_done_at = None;
            }
        }
    }

    /// Switch weapons; refills ammo. Ignored while reloading.
    pub fn switch(&mut self, kind: WeaponKind, now: Instant) -> bool {
        self.settle(now);
        if self.is_reloading(now) {
            return false;
        }
        self.current = kind;
        self.ammo = kind.stats().max_ammo;
        true
    }

    /// Start a reload unless one is running or the magazine is full
    pub fn reload(&mut self, now: Instant) -> bool {
        self.settle(now);
        if self.is_reloading(now) || self.ammo == self.current.stats().max_ammo {
            return false;
        }
        self.reload_done_at = Some(now + self.current.stats().reload_time);
        true
    }

    /// Pull the trigger. Consumes one round and auto-reloads on empty.
    pub fn try_fire(&mut self, now: Instant, alive: bool) -> Result<WeaponStats, FireBlocked> {
        self.settle(now);
        let stats = self.current.stats();

        if let Some(last) = self.last_shot {
            if now.duration_since(last) < stats.fire_interval {
                return Err(FireBlocked::Cooldown);
            }
        }
        if self.is_reloading(now) {
            return Err(FireBlocked::Reloading);
        }
        if self.ammo == 0 {
            return Err(FireBlocked::Empty);
        }
        if !alive {
            return Err(FireBlocked::Eliminated);
        }

        self.last_shot = Some(now);
        self.ammo -= 1;
        if self.ammo == 0 {
            self.reload(now);
        }
        Ok(stats)
    }
}

impl Default for Loadout {
    fn default() -> Self {
        Self::new(WeaponKind::default())
    }
}
