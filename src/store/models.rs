use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use std::fmt;
use uuid::Uuid;

/// Team registry row. `code` is the abbreviation the score feed reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Team {
    pub id: i32,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct League {
    pub id: Uuid,
    pub name: String,
    pub season: i32,
    /// Lives every member starts with; also the ceiling for manual adjustments
    pub starting_lives: i32,
    pub created_at: DateTime<Utc>,
}

/// One matchup in one week of a season.
///
/// Natural key: `(season, week, home_team_id, away_team_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Game {
    pub id: Uuid,
    pub season: i32,
    pub week: i32,
    pub home_team_id: i32,
    pub away_team_id: i32,
    pub external_id: Option<String>,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub is_final: bool,
    pub status_text: String,
    pub kickoff: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
}

/// Canonical game state as reported by the score feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameResult {
    pub season: i32,
    pub week: i32,
    pub external_id: Option<String>,
    pub home_team_id: i32,
    pub away_team_id: i32,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub is_final: bool,
    pub status_text: String,
    pub kickoff: Option<DateTime<Utc>>,
}

impl GameResult {
    /// A final result must carry both scores, and a team cannot play itself.
    pub fn validate(&self) -> Result<(), String> {
        if self.home_team_id == self.away_team_id {
            return Err(format!("team {} listed on both sides", self.home_team_id));
        }
        if self.is_final && (self.home_score.is_none() || self.away_score.is_none()) {
            return Err("final result without both scores".to_string());
        }
        Ok(())
    }

    pub fn matches(&self, game: &Game) -> bool {
        if let (Some(ours), Some(theirs)) = (&self.external_id, &game.external_id) {
            if ours == theirs {
                return true;
            }
        }
        game.season == self.season
            && game.week == self.week
            && game.home_team_id == self.home_team_id
            && game.away_team_id == self.away_team_id
    }
}

/// Result of folding a feed result into the stored row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameMerge {
    pub game: Game,
    /// Score or finality differs from the stored row
    pub changed: bool,
    /// Stored row was not final, merged row is
    pub became_final: bool,
    /// Anything at all differs, status text included
    pub dirty: bool,
}

impl Game {
    pub fn from_result(result: &GameResult, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            season: result.season,
            week: result.week,
            home_team_id: result.home_team_id,
            away_team_id: result.away_team_id,
            external_id: result.external_id.clone(),
            home_score: result.home_score,
            away_score: result.away_score,
            is_final: result.is_final,
            status_text: result.status_text.clone(),
            kickoff: result.kickoff,
            last_updated: now,
        }
    }

    /// Fold `result` into this row.
    ///
    /// A final row never goes back to non-final and never loses a score. A
    /// non-final report for a final row is ignored apart from identifiers.
    pub fn merge(&self, result: &GameResult, now: DateTime<Utc>) -> GameMerge {
        let mut next = self.clone();

        let applies = !self.is_final || result.is_final;
        if applies {
            // An external-id match may carry a corrected orientation.
            next.home_team_id = result.home_team_id;
            next.away_team_id = result.away_team_id;
        }

        if self.is_final {
            if result.is_final {
                next.home_score = result.home_score.or(self.home_score);
                next.away_score = result.away_score.or(self.away_score);
                next.status_text = result.status_text.clone();
            }
        } else {
            next.home_score = result.home_score;
            next.away_score = result.away_score;
            next.is_final = result.is_final;
            next.status_text = result.status_text.clone();
        }
        if next.external_id.is_none() {
            next.external_id = result.external_id.clone();
        }
        if result.kickoff.is_some() {
            next.kickoff = result.kickoff;
        }

        let changed = next.home_team_id != self.home_team_id
            || next.home_score != self.home_score
            || next.away_score != self.away_score
            || next.is_final != self.is_final;
        let became_final = !self.is_final && next.is_final;
        let dirty = changed
            || next.status_text != self.status_text
            || next.external_id != self.external_id
            || next.kickoff != self.kickoff;
        if dirty {
            next.last_updated = now;
        }

        GameMerge {
            game: next,
            changed,
            became_final,
            dirty,
        }
    }

    pub fn involves(&self, team_id: i32) -> bool {
        self.home_team_id == team_id || self.away_team_id == team_id
    }

    /// Kicked off and not yet final
    pub fn is_live(&self) -> bool {
        !self.is_final && (self.home_score.is_some() || self.away_score.is_some())
    }

    /// `(picked team score, opponent score)` if the team played in this game
    pub fn scores_for(&self, team_id: i32) -> Option<(Option<i32>, Option<i32>)> {
        if team_id == self.home_team_id {
            Some((self.home_score, self.away_score))
        } else if team_id == self.away_team_id {
            Some((self.away_score, self.home_score))
        } else {
            None
        }
    }
}

/// A participant's selection for one week of one league.
///
/// `auto_loss` rows have no team and no game: they record that the member
/// made no pick and were charged a life for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Pick {
    pub id: Uuid,
    pub league_id: Uuid,
    pub user_id: Uuid,
    pub week: i32,
    pub team_id: Option<i32>,
    pub game_id: Option<Uuid>,
    pub is_correct: Option<bool>,
    pub auto_loss: bool,
    /// Life deduction for this pick has been applied to the member
    pub life_applied: bool,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Pick {
    pub fn new(league_id: Uuid, user_id: Uuid, week: i32, team_id: i32, game_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            league_id,
            user_id,
            week,
            team_id: Some(team_id),
            game_id,
            is_correct: None,
            auto_loss: false,
            life_applied: false,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    pub fn auto_loss(league_id: Uuid, user_id: Uuid, week: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            league_id,
            user_id,
            week,
            team_id: None,
            game_id: None,
            is_correct: Some(false),
            auto_loss: true,
            life_applied: true,
            created_at: Utc::now(),
            resolved_at: Some(Utc::now()),
        }
    }

    /// Incorrect and not yet reflected in the member's lives
    pub fn awaiting_deduction(&self) -> bool {
        self.is_correct == Some(false) && !self.life_applied
    }
}

/// A participant's standing within one league.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LeagueMember {
    pub league_id: Uuid,
    pub user_id: Uuid,
    pub lives_remaining: i32,
    pub is_eliminated: bool,
    pub eliminated_week: Option<i32>,
    pub joined_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LeagueMember {
    pub fn new(league_id: Uuid, user_id: Uuid, lives: i32) -> Self {
        let now = Utc::now();
        Self {
            league_id,
            user_id,
            lives_remaining: lives,
            is_eliminated: false,
            eliminated_week: None,
            joined_at: now,
            updated_at: now,
        }
    }

    pub fn standing(&self) -> Standing {
        Standing {
            lives_remaining: self.lives_remaining,
            is_eliminated: self.is_eliminated,
            eliminated_week: self.eliminated_week,
        }
    }
}

/// The mutable part of a member row; used as the compare-and-swap value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub lives_remaining: i32,
    pub is_eliminated: bool,
    pub eliminated_week: Option<i32>,
}

/// Which event a life deduction is charged against. Claiming it is what
/// makes a deduction happen at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeductionClaim {
    /// Flip `life_applied` on an incorrect pick
    ResolvedPick { pick_id: Uuid },
    /// Insert the auto-loss pick for a member without a pick
    MissingPick {
        league_id: Uuid,
        user_id: Uuid,
        week: i32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Applied { pick_id: Uuid },
    /// The claim was already taken by an earlier or concurrent run
    AlreadyApplied,
    /// Member row no longer matches the expected standing
    StandingChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossReason {
    IncorrectPick,
    MissingPick,
    ManualAdjustment,
}

impl fmt::Display for LossReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LossReason::IncorrectPick => "incorrect pick",
            LossReason::MissingPick => "no pick submitted",
            LossReason::ManualAdjustment => "manual adjustment",
        };
        write!(f, "{}", text)
    }
}

/// One applied (or, in a dry run, predicted) change to a member's lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifeChange {
    pub league_id: Uuid,
    pub user_id: Uuid,
    pub pick_id: Option<Uuid>,
    pub week: i32,
    pub reason: LossReason,
    pub lives_before: i32,
    pub lives_after: i32,
    pub eliminated: bool,
}

impl LifeChange {
    pub fn deducted(&self) -> bool {
        self.lives_after < self.lives_before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(home: Option<i32>, away: Option<i32>, is_final: bool) -> GameResult {
        GameResult {
            season: 2026,
            week: 3,
            external_id: Some("401".to_string()),
            home_team_id: 1,
            away_team_id: 2,
            home_score: home,
            away_score: away,
            is_final,
            status_text: if is_final { "Final" } else { "Q2" }.to_string(),
            kickoff: None,
        }
    }

    #[test]
    fn test_merge_detects_score_change() {
        let now = Utc::now();
        let game = Game::from_result(&result(Some(3), Some(0), false), now);
        let merge = game.merge(&result(Some(10), Some(0), false), now);
        assert!(merge.changed);
        assert!(!merge.became_final);
        assert_eq!(merge.game.home_score, Some(10));
    }

    #[test]
    fn test_merge_never_unfinalizes() {
        let now = Utc::now();
        let game = Game::from_result(&result(Some(24), Some(10), true), now);
        let merge = game.merge(&result(None, None, false), now);
        assert!(!merge.changed);
        assert!(merge.game.is_final);
        assert_eq!(merge.game.home_score, Some(24));
        assert_eq!(merge.game.away_score, Some(10));
    }

    #[test]
    fn test_merge_status_only_is_dirty_not_changed() {
        let now = Utc::now();
        let game = Game::from_result(&result(Some(7), Some(7), false), now);
        let mut next = result(Some(7), Some(7), false);
        next.status_text = "Q3 4:12".to_string();
        let merge = game.merge(&next, now);
        assert!(!merge.changed);
        assert!(merge.dirty);
    }

    #[test]
    fn test_final_result_requires_scores() {
        assert!(result(Some(1), None, true).validate().is_err());
        assert!(result(None, None, false).validate().is_ok());
    }

    #[test]
    fn test_scores_for_orients_by_team() {
        let game = Game::from_result(&result(Some(24), Some(10), true), Utc::now());
        assert_eq!(game.scores_for(1), Some((Some(24), Some(10))));
        assert_eq!(game.scores_for(2), Some((Some(10), Some(24))));
        assert_eq!(game.scores_for(9), None);
    }
}
