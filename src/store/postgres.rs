use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use super::models::*;
use super::{GameStore, GameUpsert, LeagueStore, MemberStore, PickStore, Store, TeamStore};
use crate::error::{AppError, AppResult};

const GAME_COLUMNS: &str = "id, season, week, home_team_id, away_team_id, external_id, \
     home_score, away_score, is_final, status_text, kickoff, last_updated";

const PICK_COLUMNS: &str = "id, league_id, user_id, week, team_id, game_id, is_correct, \
     auto_loss, life_applied, created_at, resolved_at";

const MEMBER_COLUMNS: &str =
    "league_id, user_id, lives_remaining, is_eliminated, eliminated_week, joined_at, updated_at";

/// Postgres store - the source of truth in production
pub struct PgStore {
    pub pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ========== GAME HELPERS ==========

    /// Lock the row a result refers to. External id match sorts first.
    async fn lock_game(
        tx: &mut Transaction<'_, Postgres>,
        result: &GameResult,
    ) -> AppResult<Option<Game>> {
        let sql = format!(
            r#"
            SELECT {GAME_COLUMNS}
            FROM games
            WHERE ($1::text IS NOT NULL AND external_id = $1)
               OR (season = $2 AND week = $3 AND home_team_id = $4 AND away_team_id = $5)
            ORDER BY (external_id IS NOT DISTINCT FROM $1) DESC
            LIMIT 1
            FOR UPDATE
            "#
        );
        let game = sqlx::query_as::<_, Game>(&sql)
            .bind(&result.external_id)
            .bind(result.season)
            .bind(result.week)
            .bind(result.home_team_id)
            .bind(result.away_team_id)
            .fetch_optional(&mut **tx)
            .await?;

        Ok(game)
    }

    async fn insert_game(
        tx: &mut Transaction<'_, Postgres>,
        game: &Game,
    ) -> AppResult<Option<Game>> {
        let sql = format!(
            r#"
            INSERT INTO games ({GAME_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT DO NOTHING
            RETURNING {GAME_COLUMNS}
            "#
        );
        let inserted = sqlx::query_as::<_, Game>(&sql)
            .bind(game.id)
            .bind(game.season)
            .bind(game.week)
            .bind(game.home_team_id)
            .bind(game.away_team_id)
            .bind(&game.external_id)
            .bind(game.home_score)
            .bind(game.away_score)
            .bind(game.is_final)
            .bind(&game.status_text)
            .bind(game.kickoff)
            .bind(game.last_updated)
            .fetch_optional(&mut **tx)
            .await?;

        Ok(inserted)
    }

    async fn write_game(tx: &mut Transaction<'_, Postgres>, game: &Game) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE games
            SET home_team_id = $2, away_team_id = $3, external_id = $4,
                home_score = $5, away_score = $6, is_final = $7,
                status_text = $8, kickoff = $9, last_updated = $10
            WHERE id = $1
            "#,
        )
        .bind(game.id)
        .bind(game.home_team_id)
        .bind(game.away_team_id)
        .bind(&game.external_id)
        .bind(game.home_score)
        .bind(game.away_score)
        .bind(game.is_final)
        .bind(&game.status_text)
        .bind(game.kickoff)
        .bind(game.last_updated)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn merge_locked(
        tx: &mut Transaction<'_, Postgres>,
        stored: Game,
        result: &GameResult,
    ) -> AppResult<GameUpsert> {
        let merge = stored.merge(result, Utc::now());
        if merge.dirty {
            Self::write_game(tx, &merge.game).await?;
        }
        Ok(GameUpsert {
            game: merge.game,
            changed: merge.changed,
            became_final: merge.became_final,
        })
    }

    // ========== MEMBER HELPERS ==========

    async fn take_claim(
        tx: &mut Transaction<'_, Postgres>,
        claim: DeductionClaim,
    ) -> AppResult<Option<Uuid>> {
        match claim {
            DeductionClaim::ResolvedPick { pick_id } => {
                let result = sqlx::query(
                    r#"
                    UPDATE picks
                    SET life_applied = TRUE
                    WHERE id = $1 AND is_correct = FALSE AND life_applied = FALSE
                    "#,
                )
                .bind(pick_id)
                .execute(&mut **tx)
                .await?;

                Ok((result.rows_affected() == 1).then_some(pick_id))
            }
            DeductionClaim::MissingPick {
                league_id,
                user_id,
                week,
            } => {
                let pick = Pick::auto_loss(league_id, user_id, week);
                let result = sqlx::query(
                    r#"
                    INSERT INTO picks (id, league_id, user_id, week, team_id, game_id,
                                       is_correct, auto_loss, life_applied, created_at, resolved_at)
                    VALUES ($1, $2, $3, $4, NULL, NULL, FALSE, TRUE, TRUE, $5, $5)
                    ON CONFLICT (league_id, user_id, week) DO NOTHING
                    "#,
                )
                .bind(pick.id)
                .bind(league_id)
                .bind(user_id)
                .bind(week)
                .bind(pick.created_at)
                .execute(&mut **tx)
                .await?;

                Ok((result.rows_affected() == 1).then_some(pick.id))
            }
        }
    }

    async fn cas_standing(
        tx: &mut Transaction<'_, Postgres>,
        league_id: Uuid,
        user_id: Uuid,
        expected: Standing,
        next: Standing,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE league_members
            SET lives_remaining = $3, is_eliminated = $4, eliminated_week = $5, updated_at = NOW()
            WHERE league_id = $1 AND user_id = $2
              AND lives_remaining = $6
              AND is_eliminated = $7
              AND eliminated_week IS NOT DISTINCT FROM $8
            "#,
        )
        .bind(league_id)
        .bind(user_id)
        .bind(next.lives_remaining)
        .bind(next.is_eliminated)
        .bind(next.eliminated_week)
        .bind(expected.lives_remaining)
        .bind(expected.is_eliminated)
        .bind(expected.eliminated_week)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl GameStore for PgStore {
    async fn upsert_game(&self, result: &GameResult) -> AppResult<GameUpsert> {
        result.validate().map_err(AppError::InvalidInput)?;
        let mut tx = self.pool.begin().await?;

        if let Some(stored) = Self::lock_game(&mut tx, result).await? {
            let upsert = Self::merge_locked(&mut tx, stored, result).await?;
            tx.commit().await?;
            return Ok(upsert);
        }

        let fresh = Game::from_result(result, Utc::now());
        if let Some(game) = Self::insert_game(&mut tx, &fresh).await? {
            tx.commit().await?;
            return Ok(GameUpsert {
                became_final: game.is_final,
                game,
                changed: true,
            });
        }

        // Lost an insert race; the other writer's row is visible now.
        debug!("Concurrent insert for game {:?}, merging", result.external_id);
        let stored = Self::lock_game(&mut tx, result).await?.ok_or_else(|| {
            AppError::Conflict(format!(
                "game {} vs {} week {} vanished during upsert",
                result.home_team_id, result.away_team_id, result.week
            ))
        })?;
        let upsert = Self::merge_locked(&mut tx, stored, result).await?;
        tx.commit().await?;
        Ok(upsert)
    }

    async fn games_for_week(&self, season: i32, week: i32) -> AppResult<Vec<Game>> {
        let sql = format!(
            r#"
            SELECT {GAME_COLUMNS}
            FROM games
            WHERE season = $1 AND week = $2
            ORDER BY kickoff NULLS FIRST, home_team_id
            "#
        );
        let games = sqlx::query_as::<_, Game>(&sql)
            .bind(season)
            .bind(week)
            .fetch_all(&self.pool)
            .await?;

        Ok(games)
    }
}

#[async_trait]
impl PickStore for PgStore {
    async fn unresolved_picks_for_game(&self, game: &Game, league_id: Option<Uuid>) -> AppResult<Vec<Pick>> {
        let columns = PICK_COLUMNS
            .split(", ")
            .map(|c| format!("p.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            r#"
            SELECT {columns}
            FROM picks p
            JOIN leagues l ON l.id = p.league_id
            WHERE p.is_correct IS NULL
              AND ($6::uuid IS NULL OR p.league_id = $6)
              AND (p.game_id = $1
                   OR (p.game_id IS NULL AND l.season = $2 AND p.week = $3
                       AND p.team_id IN ($4, $5)))
            "#
        );
        let picks = sqlx::query_as::<_, Pick>(&sql)
            .bind(game.id)
            .bind(game.season)
            .bind(game.week)
            .bind(game.home_team_id)
            .bind(game.away_team_id)
            .bind(league_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(picks)
    }

    async fn resolve_pick(&self, pick_id: Uuid, game_id: Uuid, is_correct: bool) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE picks
            SET is_correct = $2, game_id = COALESCE(game_id, $3), resolved_at = NOW()
            WHERE id = $1 AND is_correct IS NULL
            "#,
        )
        .bind(pick_id)
        .bind(is_correct)
        .bind(game_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn picks_for_week(&self, league_id: Uuid, week: i32) -> AppResult<Vec<Pick>> {
        let sql = format!("SELECT {PICK_COLUMNS} FROM picks WHERE league_id = $1 AND week = $2");
        let picks = sqlx::query_as::<_, Pick>(&sql)
            .bind(league_id)
            .bind(week)
            .fetch_all(&self.pool)
            .await?;

        Ok(picks)
    }
}

#[async_trait]
impl MemberStore for PgStore {
    async fn get_member(&self, league_id: Uuid, user_id: Uuid) -> AppResult<Option<LeagueMember>> {
        let sql = format!(
            "SELECT {MEMBER_COLUMNS} FROM league_members WHERE league_id = $1 AND user_id = $2"
        );
        let member = sqlx::query_as::<_, LeagueMember>(&sql)
            .bind(league_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(member)
    }

    async fn members_for_league(&self, league_id: Uuid) -> AppResult<Vec<LeagueMember>> {
        let sql = format!(
            "SELECT {MEMBER_COLUMNS} FROM league_members WHERE league_id = $1 ORDER BY joined_at, user_id"
        );
        let members = sqlx::query_as::<_, LeagueMember>(&sql)
            .bind(league_id)
            .fetch_all(&self.pool)
            .await?;

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
        let mut tx = self.pool.begin().await?;

        let Some(pick_id) = Self::take_claim(&mut tx, claim).await? else {
            tx.rollback().await?;
            return Ok(CommitOutcome::AlreadyApplied);
        };

        if !Self::cas_standing(&mut tx, league_id, user_id, expected, next).await? {
            tx.rollback().await?;
            return Ok(CommitOutcome::StandingChanged);
        }

        tx.commit().await?;
        Ok(CommitOutcome::Applied { pick_id })
    }

    async fn swap_standing(
        &self,
        league_id: Uuid,
        user_id: Uuid,
        expected: Standing,
        next: Standing,
    ) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;
        let swapped = Self::cas_standing(&mut tx, league_id, user_id, expected, next).await?;
        tx.commit().await?;
        Ok(swapped)
    }
}

#[async_trait]
impl LeagueStore for PgStore {
    async fn get_league(&self, league_id: Uuid) -> AppResult<Option<League>> {
        let league = sqlx::query_as::<_, League>(
            r#"
            SELECT id, name, season, starting_lives, created_at
            FROM leagues
            WHERE id = $1
            "#,
        )
        .bind(league_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(league)
    }

    async fn leagues_for_season(&self, season: i32) -> AppResult<Vec<League>> {
        let leagues = sqlx::query_as::<_, League>(
            r#"
            SELECT id, name, season, starting_lives, created_at
            FROM leagues
            WHERE season = $1
            ORDER BY created_at
            "#,
        )
        .bind(season)
        .fetch_all(&self.pool)
        .await?;

        Ok(leagues)
    }
}

#[async_trait]
impl TeamStore for PgStore {
    async fn list_teams(&self) -> AppResult<Vec<Team>> {
        let teams = sqlx::query_as::<_, Team>("SELECT id, code, name FROM teams ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(teams)
    }
}

impl Store for PgStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
