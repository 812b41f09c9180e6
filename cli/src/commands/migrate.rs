// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `migrate` — applies the Postgres schema migrations (spec §6 "Persisted
//! schema") to `config.database_url`.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use sqlx::postgres::PgPoolOptions;

use aegis_workflow_core::config::OrchestratorConfig;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Args)]
pub struct MigrateArgs {
    /// Preview pending migrations without applying them.
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn run(config: &OrchestratorConfig, args: MigrateArgs) -> Result<()> {
    let database_url = config
        .database_url
        .as_deref()
        .context("no database_url configured; migrate requires the Postgres backend")?;

    println!("{}", "connecting to database...".dimmed());
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(database_url)
        .await
        .context("failed to connect to database")?;

    let applied = sqlx::query("SELECT version FROM _sqlx_migrations")
        .fetch_all(&pool)
        .await
        .map(|rows| rows.len())
        .unwrap_or(0);
    let total = MIGRATOR.iter().count();
    println!("migration status: {applied} applied, {total} total available");

    if applied >= total {
        println!("{}", "database is up to date".green());
        return Ok(());
    }

    if args.dry_run {
        println!("pending migrations (dry run):");
        for migration in MIGRATOR.iter().skip(applied) {
            println!("  - {} {}", migration.version, migration.description);
        }
        return Ok(());
    }

    println!("applying pending migrations...");
    MIGRATOR.run(&pool).await.context("failed to apply migrations")?;
    println!("{}", "database updated successfully".green());
    Ok(())
}
