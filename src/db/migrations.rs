use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::debug;

/// Run all pending migrations.
pub async fn run(pool: &SqlitePool) -> Result<()> {
    create_migration_table(pool).await?;
    let current_version = get_schema_version(pool).await?;

    if current_version < 1 {
        debug!("Running migration v1");
        run_migration_v1(pool).await?;
        set_schema_version(pool, 1).await?;
    }

    if current_version < 2 {
        debug!("Running migration v2");
        run_migration_v2(pool).await?;
        set_schema_version(pool, 2).await?;
    }

    Ok(())
}

async fn create_migration_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS _schema_version (
            version INTEGER PRIMARY KEY
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create schema version table")?;

    Ok(())
}

async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let row: Option<(i32,)> = sqlx::query_as("SELECT version FROM _schema_version LIMIT 1")
        .fetch_optional(pool)
        .await
        .context("Failed to get schema version")?;

    Ok(row.map_or(0, |(v,)| v))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("DELETE FROM _schema_version")
        .execute(pool)
        .await?;
    sqlx::query("INSERT INTO _schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

async fn run_migration_v1(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v1: creating initial schema");

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS posts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            content TEXT NOT NULL,
            image_prompt TEXT,
            image_path TEXT,
            post_type TEXT NOT NULL,
            platform TEXT NOT NULL DEFAULT 'mastodon',
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'approved', 'rejected', 'published')),
            character_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            approved_at TEXT,
            published_at TEXT,
            external_id TEXT,
            external_url TEXT,
            rejection_reason TEXT
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create posts table")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS replies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            target_post_id TEXT NOT NULL,
            content TEXT NOT NULL,
            should_reply INTEGER NOT NULL DEFAULT 1,
            reasoning TEXT,
            relevance_score INTEGER NOT NULL
                CHECK (relevance_score BETWEEN 1 AND 10),
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'approved', 'rejected', 'published')),
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            approved_at TEXT,
            published_at TEXT,
            external_id TEXT,
            external_url TEXT,
            rejection_reason TEXT
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create replies table")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS images (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            prompt TEXT NOT NULL,
            file_path TEXT NOT NULL,
            model TEXT,
            aspect_ratio TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            post_id INTEGER REFERENCES posts(id)
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create images table")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS approvals (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            content_type TEXT NOT NULL CHECK (content_type IN ('post', 'reply')),
            content_id INTEGER NOT NULL,
            approved INTEGER NOT NULL,
            rejection_reason TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create approvals table")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS rejection_feedback (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            content_type TEXT NOT NULL,
            content_preview TEXT NOT NULL,
            rejection_reason TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create rejection_feedback table")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS api_usage (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            endpoint TEXT NOT NULL,
            method TEXT NOT NULL,
            status_code INTEGER NOT NULL,
            response_time_ms INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create api_usage table")?;

    for index in [
        "CREATE INDEX IF NOT EXISTS idx_posts_status ON posts(status)",
        "CREATE INDEX IF NOT EXISTS idx_replies_status ON replies(status)",
        "CREATE INDEX IF NOT EXISTS idx_replies_target ON replies(target_post_id)",
        "CREATE INDEX IF NOT EXISTS idx_images_post ON images(post_id)",
        "CREATE INDEX IF NOT EXISTS idx_approvals_content ON approvals(content_type, content_id)",
        "CREATE INDEX IF NOT EXISTS idx_api_usage_endpoint ON api_usage(endpoint, method)",
    ] {
        sqlx::query(index)
            .execute(pool)
            .await
            .context("Failed to create index")?;
    }

    Ok(())
}

/// Make append-only tables reject updates and deletes.
async fn run_migration_v2(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v2: immutability triggers");

    for trigger in [
        r"
        CREATE TRIGGER IF NOT EXISTS approvals_no_update
        BEFORE UPDATE ON approvals
        BEGIN
            SELECT RAISE(ABORT, 'approval records are immutable');
        END
        ",
        r"
        CREATE TRIGGER IF NOT EXISTS approvals_no_delete
        BEFORE DELETE ON approvals
        BEGIN
            SELECT RAISE(ABORT, 'approval records are immutable');
        END
        ",
        r"
        CREATE TRIGGER IF NOT EXISTS rejection_feedback_no_update
        BEFORE UPDATE ON rejection_feedback
        BEGIN
            SELECT RAISE(ABORT, 'rejection feedback is append-only');
        END
        ",
        r"
        CREATE TRIGGER IF NOT EXISTS images_no_update
        BEFORE UPDATE ON images
        BEGIN
            SELECT RAISE(ABORT, 'images are immutable');
        END
        ",
    ] {
        sqlx::query(trigger)
            .execute(pool)
            .await
            .context("Failed to create immutability trigger")?;
    }

    Ok(())
}
