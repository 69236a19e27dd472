use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::models::*;
use super::{GameStore, GameUpsert, LeagueStore, MemberStore, PickStore, Store, TeamStore};
use crate::error::{AppError, AppResult};

#[derive(Debug, Default, Clone)]
struct Tables {
    teams: HashMap<i32, Team>,
    leagues: HashMap<Uuid, League>,
    members: HashMap<(Uuid, Uuid), LeagueMember>,
    games: HashMap<Uuid, Game>,
    picks: HashMap<Uuid, Pick>,
}

impl Tables {
    fn league_season(&self, league_id: Uuid) -> Option<i32> {
        self.leagues.get(&league_id).map(|l| l.season)
    }
}

/// In-memory store. A single lock over all tables makes every trait method
/// atomic, matching the transactional behaviour of the Postgres store.
///
/// Backs development mode, tests, and the dry-run sandbox.
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    /// Copy everything one league-week settlement can read or write.
    pub async fn snapshot(source: &dyn Store, league: &League, week: i32) -> AppResult<Self> {
        let mut tables = Tables::default();

        for team in source.list_teams().await? {
            tables.teams.insert(team.id, team);
        }
        tables.leagues.insert(league.id, league.clone());
        for game in source.games_for_week(league.season, week).await? {
            tables.games.insert(game.id, game);
        }
        for pick in source.picks_for_week(league.id, week).await? {
            tables.picks.insert(pick.id, pick);
        }
        for member in source.members_for_league(league.id).await? {
            tables.members.insert((member.league_id, member.user_id), member);
        }

        Ok(Self {
            tables: RwLock::new(tables),
        })
    }

    pub async fn insert_team(&self, team: Team) {
        self.tables.write().await.teams.insert(team.id, team);
    }

    pub async fn insert_league(&self, league: League) {
        self.tables.write().await.leagues.insert(league.id, league);
    }

    pub async fn insert_member(&self, member: LeagueMember) {
        self.tables
            .write()
            .await
            .members
            .insert((member.league_id, member.user_id), member);
    }

    pub async fn insert_pick(&self, pick: Pick) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        let duplicate = tables.picks.values().any(|p| {
            p.league_id == pick.league_id && p.user_id == pick.user_id && p.week == pick.week
        });
        if duplicate {
            return Err(AppError::Conflict(format!(
                "user {} already has a pick for week {}",
                pick.user_id, pick.week
            )));
        }
        tables.picks.insert(pick.id, pick);
        Ok(())
    }

    pub async fn get_pick(&self, pick_id: Uuid) -> Option<Pick> {
        self.tables.read().await.picks.get(&pick_id).cloned()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GameStore for MemoryStore {
    async fn upsert_game(&self, result: &GameResult) -> AppResult<GameUpsert> {
        result.validate().map_err(AppError::InvalidInput)?;
        let now = Utc::now();
        let mut tables = self.tables.write().await;

        // External id wins over the natural key when both could match.
        let existing = tables
            .games
            .values()
            .filter(|g| result.matches(g))
            .max_by_key(|g| g.external_id.is_some() && g.external_id == result.external_id)
            .cloned();

        match existing {
            Some(stored) => {
                let merge = stored.merge(result, now);
                if merge.dirty {
                    tables.games.insert(merge.game.id, merge.game.clone());
                }
                Ok(GameUpsert {
                    game: merge.game,
                    changed: merge.changed,
                    became_final: merge.became_final,
                })
            }
            None => {
                let game = Game::from_result(result, now);
                tables.games.insert(game.id, game.clone());
                Ok(GameUpsert {
                    became_final: game.is_final,
                    game,
                    changed: true,
                })
            }
        }
    }

    async fn games_for_week(&self, season: i32, week: i32) -> AppResult<Vec<Game>> {
        let tables = self.tables.read().await;
        let mut games: Vec<Game> = tables
            .games
            .values()
            .filter(|g| g.season == season && g.week == week)
            .cloned()
            .collect();
        games.sort_by_key(|g| (g.kickoff, g.home_team_id));
        Ok(games)
    }
}

#[async_trait]
impl PickStore for MemoryStore {
    async fn unresolved_picks_for_game(&self, game: &Game, league_id: Option<Uuid>) -> AppResult<Vec<Pick>> {
        let tables = self.tables.read().await;
        let picks = tables
            .picks
            .values()
            .filter(|p| p.is_correct.is_none())
            .filter(|p| league_id.map_or(true, |id| p.league_id == id))
            .filter(|p| match p.game_id {
                Some(game_id) => game_id == game.id,
                None => {
                    p.week == game.week
                        && p.team_id.map(|t| game.involves(t)).unwrap_or(false)
                        && tables.league_season(p.league_id) == Some(game.season)
                }
            })
            .cloned()
            .collect();
        Ok(picks)
    }

    async fn resolve_pick(&self, pick_id: Uuid, game_id: Uuid, is_correct: bool) -> AppResult<bool> {
        let mut tables = self.tables.write().await;
        let pick = tables
            .picks
            .get_mut(&pick_id)
            .ok_or_else(|| AppError::NotFound(format!("Pick {} not found", pick_id)))?;

        if pick.is_correct.is_some() {
            return Ok(false);
        }
        pick.is_correct = Some(is_correct);
        pick.game_id.get_or_insert(game_id);
        pick.resolved_at = Some(Utc::now());
        Ok(true)
    }

    async fn picks_for_week(&self, league_id: Uuid, week: i32) -> AppResult<Vec<Pick>> {
        let tables = self.tables.read().await;
        Ok(tables
            .picks
            .values()
            .filter(|p| p.league_id == league_id && p.week == week)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MemberStore for MemoryStore {
    async fn get_member(&self, league_id: Uuid, user_id: Uuid) -> AppResult<Option<LeagueMember>> {
        Ok(self.tables.read().await.members.get(&(league_id, user_id)).cloned())
    }

    async fn members_for_league(&self, league_id: Uuid) -> AppResult<Vec<LeagueMember>> {
        let tables = self.tables.read().await;
        let mut members: Vec<LeagueMember> = tables
            .members
            .values()
            .filter(|m| m.league_id == league_id)
            .cloned()
            .collect();
        members.sort_by_key(|m| (m.joined_at, m.user_id));
        Ok(members)
    }

    async fn commit_life_change(
        &self,
        league_id: Uuid,
        user_id: Uuid,
        claim: DeductionClaim,
        expected: Standing,
        next: Standing,
    ) -> AppResult<CommitOutcome> {
        let mut tables = self.tables.write().await;

        let claimable = match claim {
            DeductionClaim::ResolvedPick { pick_id } => tables
                .picks
                .get(&pick_id)
                .map(|p| p.awaiting_deduction())
                .unwrap_or(false),
            DeductionClaim::MissingPick { league_id, user_id, week } => !tables
                .picks
                .values()
                .any(|p| p.league_id == league_id && p.user_id == user_id && p.week == week),
        };
        if !claimable {
            return Ok(CommitOutcome::AlreadyApplied);
        }

        let member = tables
            .members
            .get(&(league_id, user_id))
            .ok_or_else(|| AppError::NotFound(format!("Member {} in league {}", user_id, league_id)))?;
        if member.standing() != expected {
            return Ok(CommitOutcome::StandingChanged);
        }

        let pick_id = match claim {
            DeductionClaim::ResolvedPick { pick_id } => {
                if let Some(pick) = tables.picks.get_mut(&pick_id) {
                    pick.life_applied = true;
                }
                pick_id
            }
            DeductionClaim::MissingPick { league_id, user_id, week } => {
                let pick = Pick::auto_loss(league_id, user_id, week);
                let pick_id = pick.id;
                tables.picks.insert(pick_id, pick);
                pick_id
            }
        };

        if let Some(member) = tables.members.get_mut(&(league_id, user_id)) {
            member.lives_remaining = next.lives_remaining;
            member.is_eliminated = next.is_eliminated;
            member.eliminated_week = next.eliminated_week;
            member.updated_at = Utc::now();
        }

        Ok(CommitOutcome::Applied { pick_id })
    }

    async fn swap_standing(
        &self,
        league_id: Uuid,
        user_id: Uuid,
        expected: Standing,
        next: Standing,
    ) -> AppResult<bool> {
        let mut tables = self.tables.write().await;
        let member = tables
            .members
            .get_mut(&(league_id, user_id))
            .ok_or_else(|| AppError::NotFound(format!("Member {} in league {}", user_id, league_id)))?;

        if member.standing() != expected {
            return Ok(false);
        }
        member.lives_remaining = next.lives_remaining;
        member.is_eliminated = next.is_eliminated;
        member.eliminated_week = next.eliminated_week;
        member.updated_at = Utc::now();
        Ok(true)
    }
}

#[async_trait]
impl LeagueStore for MemoryStore {
    async fn get_league(&self, league_id: Uuid) -> AppResult<Option<League>> {
        Ok(self.tables.read().await.leagues.get(&league_id).cloned())
    }

    async fn leagues_for_season(&self, season: i32) -> AppResult<Vec<League>> {
        let tables = self.tables.read().await;
        Ok(tables
            .leagues
            .values()
            .filter(|l| l.season == season)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TeamStore for MemoryStore {
    async fn list_teams(&self) -> AppResult<Vec<Team>> {
        let tables = self.tables.read().await;
        let mut teams: Vec<Team> = tables.teams.values().cloned().collect();
        teams.sort_by_key(|t| t.id);
        Ok(teams)
    }
}

impl Store for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
