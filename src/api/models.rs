use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::store::models::{League, LeagueMember};

// ========== REQUEST MODELS ==========

/// Query for `POST /leagues/:league_id/settle`
///
/// `season` defaults to the league's season, `week` to the most recently
/// completed week of the configured calendar.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct SettleParams {
    #[validate(range(min = 2000, max = 2100))]
    pub season: Option<i32>,
    #[validate(range(min = 1, max = 25))]
    pub week: Option<i32>,
    #[serde(default)]
    pub dry_run: bool,
}

/// Query for `POST /seasons/:season/live-scores/poll`
#[derive(Debug, Default, Deserialize, Validate)]
pub struct PollParams {
    #[validate(range(min = 1, max = 25))]
    pub week: Option<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SeasonPath {
    #[validate(range(min = 2000, max = 2100))]
    pub season: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct WeekPath {
    pub league_id: Uuid,
    #[validate(range(min = 1, max = 25))]
    pub week: i32,
}

// ========== RESPONSE MODELS ==========

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub store: String,
    pub season: i32,
    pub current_week: i32,
}

#[derive(Debug, Serialize)]
pub struct MemberResponse {
    pub user_id: Uuid,
    pub lives_remaining: i32,
    pub is_eliminated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eliminated_week: Option<i32>,
}

impl From<LeagueMember> for MemberResponse {
    fn from(member: LeagueMember) -> Self {
        Self {
            user_id: member.user_id,
            lives_remaining: member.lives_remaining,
            is_eliminated: member.is_eliminated,
            eliminated_week: member.eliminated_week,
        }
    }
}

/// League standings: survivors first, then eliminated members by how
/// long they lasted.
#[derive(Debug, Serialize)]
pub struct StandingsResponse {
    pub league_id: Uuid,
    pub name: String,
    pub season: i32,
    pub starting_lives: i32,
    pub active: usize,
    pub eliminated: usize,
    pub members: Vec<MemberResponse>,
}

impl StandingsResponse {
    pub fn new(league: League, mut members: Vec<LeagueMember>) -> Self {
        members.sort_by(|a, b| {
            b.lives_remaining
                .cmp(&a.lives_remaining)
                .then_with(|| b.eliminated_week.cmp(&a.eliminated_week))
        });
        let eliminated = members.iter().filter(|m| m.is_eliminated).count();

        Self {
            league_id: league.id,
            name: league.name,
            season: league.season,
            starting_lives: league.starting_lives,
            active: members.len() - eliminated,
            eliminated,
            members: members.into_iter().map(MemberResponse::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{league, member};

    #[test]
    fn test_settle_params_bounds() {
        let ok = SettleParams {
            season: Some(2026),
            week: Some(18),
            dry_run: true,
        };
        assert!(ok.validate().is_ok());

        let bad_week = SettleParams {
            week: Some(0),
            ..Default::default()
        };
        assert!(bad_week.validate().is_err());

        let bad_season = SettleParams {
            season: Some(1899),
            ..Default::default()
        };
        assert!(bad_season.validate().is_err());
    }

    #[test]
    fn test_standings_order() {
        let league = league(2026, 2);
        let mut early = member(&league);
        early.lives_remaining = 0;
        early.is_eliminated = true;
        early.eliminated_week = Some(2);
        let mut late = member(&league);
        late.lives_remaining = 0;
        late.is_eliminated = true;
        late.eliminated_week = Some(6);
        let alive = member(&league);

        let standings = StandingsResponse::new(league, vec![early.clone(), alive.clone(), late.clone()]);
        let order: Vec<_> = standings.members.iter().map(|m| m.user_id).collect();
        assert_eq!(order, vec![alive.user_id, late.user_id, early.user_id]);
        assert_eq!(standings.active, 1);
        assert_eq!(standings.eliminated, 2);
    }
}
