//! Game lifecycle: Lobby -> InProgress -> Ended
//!
//! Transitions are host-exclusive. Clients only mirror the phase from
//! `startGame` and `gameEnded`.

use crate::game::state::Roster;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GamePhase {
    /// Accepting connections; host can add/remove bots and start
    #[default]
    Lobby,
    InProgress,
    /// Terminal
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("Cannot move from {from:?} to {to:?}")]
    IllegalTransition { from: GamePhase, to: GamePhase },
}

/// Why a match ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    OnlyBotsLeft,
    AllPlayersEliminated,
    Winner { name: String },
}

impl EndReason {
    /// Message carried by `gameEnded`
    pub fn message(&self) -> String {
        match self {
            EndReason::OnlyBotsLeft => "Game ended - only bots left".to_string(),
            EndReason::AllPlayersEliminated => "All players eliminated!".to_string(),
            EndReason::Winner { name } => format!("{} wins! Game ending...", name),
        }
    }
}

/// Monotonic phase holder
#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    phase: GamePhase,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn is_lobby(&self) -> bool {
        self.phase == GamePhase::Lobby
    }

    pub fn in_progress(&self) -> bool {
        self.phase == GamePhase::InProgress
    }

    pub fn is_ended(&self) -> bool {
        self.phase == GamePhase::Ended
    }

    /// Lobby -> InProgress
    pub fn start(&mut self) -> Result<(), LifecycleError> {
        self.transition(GamePhase::Lobby, GamePhase::InProgress)
    }

    /// Any non-terminal phase -> Ended. A session can end from the lobby when
    /// the host leaves or a client is told the match is over.
    pub fn end(&mut self) -> Result<(), LifecycleError> {
        if self.phase == GamePhase::Ended {
            return Err(LifecycleError::IllegalTransition {
                from: self.phase,
                to: GamePhase::Ended,
            });
        }
        self.phase = GamePhase::Ended;
        Ok(())
    }

    fn transition(&mut self, from: GamePhase, to: GamePhase) -> Result<(), LifecycleError> {
        if self.phase != from {
            return Err(LifecycleError::IllegalTransition {
                from: self.phase,
                to,
            });
        }
        self.phase = to;
        Ok(())
    }
}

/// End-condition check, run by the host after every elimination,
/// disconnection or respawn while the match is in progress.
pub fn evaluate(roster: &Roster) -> Option<EndReason> {
    let humans = roster.human_count();
    if humans == 0 {
        return Some(EndReason::OnlyBotsLeft);
    }
    if roster.alive_human_count() == 0 {
        return Some(EndReason::AllPlayersEliminated);
    }
    if roster.alive_count() <= 1 || roster.len() <= 1 {
        // A human is alive here, so there is always someone to name
        return roster.last_alive().map(|winner| EndReason::Winner {
            name: winner.name.clone(),
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::Player;
    use crate::util::vec3::Vec3;
    use tokio::time::Instant;

    fn human(id: &str) -> Player {
        Player::new_human(id.into(), format!("Human {}", id), Vec3::ZERO)
    }

    fn bot(id: &str) -> Player {
        Player::new_bot(id.into(), format!("Bot {}", id), Vec3::ZERO)
    }

    #[test]
    fn test_phase_is_monotonic() {
        let mut lc = Lifecycle::new();
        assert!(lc.is_lobby());
        lc.start().unwrap();
        assert!(lc.in_progress());
        assert!(lc.start().is_err());
        lc.end().unwrap();
        assert!(lc.is_ended());
        assert!(lc.start().is_err());
        assert!(lc.end().is_err());
    }

    #[test]
    fn test_lobby_can_end_directly() {
        let mut lc = Lifecycle::new();
        lc.end().unwrap();
        assert_eq!(lc.phase(), GamePhase::Ended);
    }

    #[test]
    fn test_no_end_with_two_alive_humans() {
        let mut roster = Roster::new();
        roster.insert(human("a"));
        roster.insert(human("b"));
        assert_eq!(evaluate(&roster), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_humans_dead_ends_even_with_bots() {
        let now = Instant::now();
        let mut roster = Roster::new();
        roster.insert(human("host"));
        for i in 0..3 {
            roster.insert(bot(&format!("b{}", i)));
        }
        roster.get_mut("host").unwrap().apply_damage(100, now);

        let reason = evaluate(&roster).unwrap();
        assert_eq!(reason, EndReason::AllPlayersEliminated);
        assert_eq!(reason.message(), "All players eliminated!");
    }

    #[test]
    fn test_only_bots_left() {
        let mut roster = Roster::new();
        roster.insert(bot("b1"));
        roster.insert(bot("b2"));
        assert_eq!(evaluate(&roster), Some(EndReason::OnlyBotsLeft));
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_survivor_wins() {
        let now = Instant::now();
        let mut roster = Roster::new();
        roster.insert(human("a"));
        roster.insert(human("b"));
        roster.insert(human("c"));
        roster.get_mut("a").unwrap().apply_damage(100, now);
        assert_eq!(evaluate(&roster), None);
        roster.get_mut("c").unwrap().apply_damage(100, now);

        let reason = evaluate(&roster).unwrap();
        assert_eq!(reason.message(), "Human b wins! Game ending...");
    }

    #[test]
    fn test_single_player_roster_ends() {
        let mut roster = Roster::new();
        roster.insert(human("solo"));
        assert_eq!(
            evaluate(&roster),
            Some(EndReason::Winner {
                name: "Human solo".into()
            })
        );
    }

    #[test]
    fn test_last_human_standing_among_dead_bots_wins() {
        let mut roster = Roster::new();
        roster.insert(human("a"));
        let mut dead = bot("b");
        dead.set_health(0);
        roster.insert(dead);
        assert_eq!(
            evaluate(&roster),
            Some(EndReason::Winner {
                name: "Human a".into()
            })
        );
    }
}
