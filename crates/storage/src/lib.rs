use anyhow::{Context, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite, Transaction,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::{HopAddition, MashStep, Program, ProgramId, ProgramSummary};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn list_programs(&self) -> Result<Vec<ProgramSummary>> {
        let rows = sqlx::query("SELECT id, name FROM programs ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| ProgramSummary {
                id: ProgramId(r.get::<i64, _>(0)),
                name: r.get::<String, _>(1),
            })
            .collect())
    }

    /// True when no program other than `exclude` already uses `name`.
    pub async fn program_name_available(
        &self,
        name: &str,
        exclude: Option<ProgramId>,
    ) -> Result<bool> {
        let taken: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM programs WHERE name = ? AND id != ?")
                .bind(name)
                .bind(exclude.map(|id| id.0).unwrap_or(-1))
                .fetch_one(&self.pool)
                .await?;
        Ok(taken == 0)
    }

    pub async fn create_program(&self, program: &Program) -> Result<ProgramId> {
        let mut tx = self.pool.begin().await?;
        let rec = sqlx::query(
            "INSERT INTO programs (name, starttemp, endtemp, boiltime, nomash, noboil)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&program.name)
        .bind(program.starttemp)
        .bind(program.endtemp)
        .bind(program.boiltime)
        .bind(program.nomash)
        .bind(program.noboil)
        .fetch_one(&mut *tx)
        .await
        .with_context(|| format!("failed to insert program '{}'", program.name))?;
        let program_id = ProgramId(rec.get::<i64, _>(0));

        insert_children(&mut tx, program_id, program).await?;
        tx.commit().await?;
        Ok(program_id)
    }

    /// Replaces the program row and all of its mash steps and hops. Returns
    /// false when no program with `program_id` exists.
    pub async fn update_program(&self, program_id: ProgramId, program: &Program) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            "UPDATE programs
             SET name = ?, starttemp = ?, endtemp = ?, boiltime = ?, nomash = ?, noboil = ?
             WHERE id = ?",
        )
        .bind(&program.name)
        .bind(program.starttemp)
        .bind(program.endtemp)
        .bind(program.boiltime)
        .bind(program.nomash)
        .bind(program.noboil)
        .bind(program_id.0)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if updated == 0 {
            return Ok(false);
        }

        delete_children(&mut tx, program_id).await?;
        insert_children(&mut tx, program_id, program).await?;
        tx.commit().await?;
        Ok(true)
    }

    pub async fn get_program(&self, program_id: ProgramId) -> Result<Option<Program>> {
        let Some(row) = sqlx::query(
            "SELECT name, starttemp, endtemp, boiltime, nomash, noboil
             FROM programs WHERE id = ?",
        )
        .bind(program_id.0)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let mashsteps = sqlx::query(
            "SELECT orderno, temp, holdtime FROM mashsteps
             WHERE program_id = ? ORDER BY position ASC",
        )
        .bind(program_id.0)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|r| MashStep {
            order: r.get::<i64, _>(0),
            temp: r.get::<f64, _>(1),
            holdtime: r.get::<i64, _>(2),
        })
        .collect();

        let hops = sqlx::query(
            "SELECT attime, quantity, name FROM hops
             WHERE program_id = ? ORDER BY position ASC",
        )
        .bind(program_id.0)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|r| HopAddition {
            attime: r.get::<i64, _>(0),
            quantity: r.get::<f64, _>(1),
            name: r.get::<String, _>(2),
        })
        .collect();

        Ok(Some(Program {
            id: Some(program_id),
            name: row.get::<String, _>(0),
            starttemp: row.get::<f64, _>(1),
            endtemp: row.get::<f64, _>(2),
            boiltime: row.get::<i64, _>(3),
            nomash: row.get::<bool, _>(4),
            noboil: row.get::<bool, _>(5),
            mashsteps,
            hops,
        }))
    }

    pub async fn delete_program(&self, program_id: ProgramId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        delete_children(&mut tx, program_id).await?;
        let deleted = sqlx::query("DELETE FROM programs WHERE id = ?")
            .bind(program_id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(deleted > 0)
    }
}

async fn insert_children(
    tx: &mut Transaction<'_, Sqlite>,
    program_id: ProgramId,
    program: &Program,
) -> Result<()> {
    for (position, step) in program.mashsteps.iter().enumerate() {
        sqlx::query(
            "INSERT INTO mashsteps (program_id, position, orderno, temp, holdtime)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(program_id.0)
        .bind(position as i64)
        .bind(step.order)
        .bind(step.temp)
        .bind(step.holdtime)
        .execute(&mut **tx)
        .await
        .context("failed to insert mash step")?;
    }

    for (position, hop) in program.hops.iter().enumerate() {
        sqlx::query(
            "INSERT INTO hops (program_id, position, attime, quantity, name)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(program_id.0)
        .bind(position as i64)
        .bind(hop.attime)
        .bind(hop.quantity)
        .bind(&hop.name)
        .execute(&mut **tx)
        .await
        .context("failed to insert hop addition")?;
    }

    Ok(())
}

async fn delete_children(tx: &mut Transaction<'_, Sqlite>, program_id: ProgramId) -> Result<()> {
    sqlx::query("DELETE FROM mashsteps WHERE program_id = ?")
        .bind(program_id.0)
        .execute(&mut **tx)
        .await?;
    sqlx::query("DELETE FROM hops WHERE program_id = ?")
        .bind(program_id.0)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
