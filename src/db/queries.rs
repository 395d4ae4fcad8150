use anyhow::{Context, Result};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::models::{
    ApprovalFilter, ApprovalRecord, ContentStatus, ContentType, EndpointUsage, Image, NewDecision,
    NewImage, NewPost, NewReply, Post, RejectionFeedback, Reply, StatusCounts, TransitionOutcome,
};
use crate::constants::FEEDBACK_PREVIEW_CHARS;

// ========== Posts ==========

/// Insert a new pending post, returning its ID.
pub async fn insert_post(pool: &SqlitePool, post: &NewPost) -> Result<i64> {
    let result = sqlx::query(
        r"
        INSERT INTO posts (content, image_prompt, image_path, post_type, platform, status, character_count)
        VALUES (?, ?, ?, ?, ?, 'pending', ?)
        ",
    )
    .bind(&post.content)
    .bind(&post.image_prompt)
    .bind(&post.image_path)
    .bind(&post.post_type)
    .bind(&post.platform)
    .bind(post.content.chars().count() as i64)
    .execute(pool)
    .await
    .context("Failed to insert post")?;

    Ok(result.last_insert_rowid())
}

/// Get a post by ID.
pub async fn get_post(pool: &SqlitePool, id: i64) -> Result<Option<Post>> {
    sqlx::query_as("SELECT * FROM posts WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch post")
}

/// List posts, newest first, optionally filtered by status.
pub async fn list_posts(
    pool: &SqlitePool,
    status: Option<ContentStatus>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Post>> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM posts WHERE 1=1");
    if let Some(status) = status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    qb.build_query_as::<Post>()
        .fetch_all(pool)
        .await
        .context("Failed to list posts")
}

/// Get published posts that carry an external status ID.
pub async fn get_published_posts(pool: &SqlitePool) -> Result<Vec<Post>> {
    sqlx::query_as(
        r"
        SELECT * FROM posts
        WHERE status = 'published' AND external_id IS NOT NULL
        ORDER BY published_at DESC, id DESC
        ",
    )
    .fetch_all(pool)
    .await
    .context("Failed to fetch published posts")
}

// ========== Replies ==========

/// Insert a new pending reply, returning its ID.
pub async fn insert_reply(pool: &SqlitePool, reply: &NewReply) -> Result<i64> {
    let result = sqlx::query(
        r"
        INSERT INTO replies (target_post_id, content, should_reply, reasoning, relevance_score, status)
        VALUES (?, ?, ?, ?, ?, 'pending')
        ",
    )
    .bind(&reply.target_post_id)
    .bind(&reply.content)
    .bind(reply.should_reply)
    .bind(&reply.reasoning)
    .bind(reply.relevance_score)
    .execute(pool)
    .await
    .context("Failed to insert reply")?;

    Ok(result.last_insert_rowid())
}

/// Get a reply by ID.
pub async fn get_reply(pool: &SqlitePool, id: i64) -> Result<Option<Reply>> {
    sqlx::query_as("SELECT * FROM replies WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch reply")
}

/// List replies, newest first, optionally filtered by status and target post.
pub async fn list_replies(
    pool: &SqlitePool,
    status: Option<ContentStatus>,
    target_post_id: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Reply>> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM replies WHERE 1=1");
    if let Some(status) = status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(target) = target_post_id {
        qb.push(" AND target_post_id = ").push_bind(target);
    }
    qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    qb.build_query_as::<Reply>()
        .fetch_all(pool)
        .await
        .context("Failed to list replies")
}

// ========== Lifecycle ==========

/// Apply an approve/reject decision to a pending post or reply.
///
/// The status change, the approval record and (on rejection) the rejection
/// feedback row are written in one transaction. Nothing is written unless
/// the row is currently `pending`.
pub async fn record_decision(pool: &SqlitePool, decision: &NewDecision) -> Result<TransitionOutcome> {
    let table = decision.content_type.table();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let updated = if decision.approved {
        let sql = format!(
            "UPDATE {table} SET status = 'approved', approved_at = datetime('now') \
             WHERE id = ? AND status = 'pending'"
        );
        sqlx::query(&sql)
            .bind(decision.content_id)
            .execute(&mut *tx)
            .await
    } else {
        let sql = format!(
            "UPDATE {table} SET status = 'rejected', rejection_reason = ? \
             WHERE id = ? AND status = 'pending'"
        );
        sqlx::query(&sql)
            .bind(&decision.rejection_reason)
            .bind(decision.content_id)
            .execute(&mut *tx)
            .await
    }
    .with_context(|| format!("Failed to update {} status", decision.content_type))?;

    if updated.rows_affected() == 0 {
        let outcome = current_status(&mut tx, decision.content_type, decision.content_id).await?;
        tx.rollback().await.context("Failed to roll back decision")?;
        return Ok(outcome);
    }

    sqlx::query(
        r"
        INSERT INTO approvals (content_type, content_id, approved, rejection_reason)
        VALUES (?, ?, ?, ?)
        ",
    )
    .bind(decision.content_type.as_str())
    .bind(decision.content_id)
    .bind(decision.approved)
    .bind(&decision.rejection_reason)
    .execute(&mut *tx)
    .await
    .context("Failed to insert approval record")?;

    if !decision.approved {
        let sql = format!(
            "INSERT INTO rejection_feedback (content_type, content_preview, rejection_reason) \
             SELECT ?, substr(content, 1, ?), ? FROM {table} WHERE id = ?"
        );
        sqlx::query(&sql)
            .bind(decision.content_type.as_str())
            .bind(FEEDBACK_PREVIEW_CHARS as i64)
            .bind(&decision.rejection_reason)
            .bind(decision.content_id)
            .execute(&mut *tx)
            .await
            .context("Failed to insert rejection feedback")?;
    }

    tx.commit().await.context("Failed to commit decision")?;
    Ok(TransitionOutcome::Applied)
}

/// Mark an approved post or reply as published.
///
/// Only rows currently `approved` are changed.
pub async fn mark_published(
    pool: &SqlitePool,
    content_type: ContentType,
    id: i64,
    external_id: Option<&str>,
    external_url: Option<&str>,
) -> Result<TransitionOutcome> {
    let table = content_type.table();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let sql = format!(
        "UPDATE {table} SET status = 'published', published_at = datetime('now'), \
         external_id = ?, external_url = ? WHERE id = ? AND status = 'approved'"
    );
    let updated = sqlx::query(&sql)
        .bind(external_id)
        .bind(external_url)
        .bind(id)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to mark {content_type} published"))?;

    if updated.rows_affected() == 0 {
        let outcome = current_status(&mut tx, content_type, id).await?;
        tx.rollback().await.context("Failed to roll back publish")?;
        return Ok(outcome);
    }

    tx.commit().await.context("Failed to commit publish")?;
    Ok(TransitionOutcome::Applied)
}

async fn current_status(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    content_type: ContentType,
    id: i64,
) -> Result<TransitionOutcome> {
    let sql = format!("SELECT status FROM {} WHERE id = ?", content_type.table());
    let row: Option<(String,)> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .with_context(|| format!("Failed to read {content_type} status"))?;

    Ok(row.map_or(TransitionOutcome::NotFound, |(status,)| {
        TransitionOutcome::WrongStatus(status)
    }))
}

/// Count rows per lifecycle status.
pub async fn count_by_status(pool: &SqlitePool, content_type: ContentType) -> Result<StatusCounts> {
    let sql = format!(
        "SELECT status, COUNT(*) FROM {} GROUP BY status",
        content_type.table()
    );
    let rows: Vec<(String, i64)> = sqlx::query_as(&sql)
        .fetch_all(pool)
        .await
        .with_context(|| format!("Failed to count {content_type} statuses"))?;

    let mut counts = StatusCounts::default();
    for (status, count) in rows {
        match ContentStatus::from_str(&status) {
            Some(ContentStatus::Pending) => counts.pending = count,
            Some(ContentStatus::Approved) => counts.approved = count,
            Some(ContentStatus::Rejected) => counts.rejected = count,
            Some(ContentStatus::Published) => counts.published = count,
            None => {}
        }
    }
    Ok(counts)
}

// ========== Images ==========

/// Insert a generated image, returning its ID.
pub async fn insert_image(pool: &SqlitePool, image: &NewImage) -> Result<i64> {
    let result = sqlx::query(
        r"
        INSERT INTO images (prompt, file_path, model, aspect_ratio, post_id)
        VALUES (?, ?, ?, ?, ?)
        ",
    )
    .bind(&image.prompt)
    .bind(&image.file_path)
    .bind(&image.model)
    .bind(&image.aspect_ratio)
    .bind(image.post_id)
    .execute(pool)
    .await
    .context("Failed to insert image")?;

    Ok(result.last_insert_rowid())
}

/// Get an image by ID.
pub async fn get_image(pool: &SqlitePool, id: i64) -> Result<Option<Image>> {
    sqlx::query_as("SELECT * FROM images WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch image")
}

/// List images, newest first, optionally only those attached to a post.
pub async fn list_images(
    pool: &SqlitePool,
    post_id: Option<i64>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Image>> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM images WHERE 1=1");
    if let Some(post_id) = post_id {
        qb.push(" AND post_id = ").push_bind(post_id);
    }
    qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    qb.build_query_as::<Image>()
        .fetch_all(pool)
        .await
        .context("Failed to list images")
}

// ========== Approvals ==========

/// List approval records, newest first.
pub async fn list_approvals(
    pool: &SqlitePool,
    filter: &ApprovalFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<ApprovalRecord>> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM approvals WHERE 1=1");
    if let Some(content_type) = filter.content_type {
        qb.push(" AND content_type = ").push_bind(content_type.as_str());
    }
    if let Some(approved) = filter.approved {
        qb.push(" AND approved = ").push_bind(approved);
    }
    qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    qb.build_query_as::<ApprovalRecord>()
        .fetch_all(pool)
        .await
        .context("Failed to list approvals")
}

/// Count approval records as `(approved, rejected)`.
pub async fn count_approvals(pool: &SqlitePool) -> Result<(i64, i64)> {
    let (approved, rejected): (Option<i64>, Option<i64>) = sqlx::query_as(
        r"
        SELECT
            SUM(CASE WHEN approved = 1 THEN 1 ELSE 0 END),
            SUM(CASE WHEN approved = 0 THEN 1 ELSE 0 END)
        FROM approvals
        ",
    )
    .fetch_one(pool)
    .await
    .context("Failed to count approvals")?;

    Ok((approved.unwrap_or(0), rejected.unwrap_or(0)))
}

/// Most recent rejection feedback rows.
pub async fn recent_rejection_feedback(
    pool: &SqlitePool,
    limit: i64,
) -> Result<Vec<RejectionFeedback>> {
    sqlx::query_as("SELECT * FROM rejection_feedback ORDER BY created_at DESC, id DESC LIMIT ?")
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to fetch rejection feedback")
}

// ========== API usage ==========

/// Record one served HTTP request.
pub async fn insert_api_usage(
    pool: &SqlitePool,
    endpoint: &str,
    method: &str,
    status_code: u16,
    response_time_ms: i64,
) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO api_usage (endpoint, method, status_code, response_time_ms)
        VALUES (?, ?, ?, ?)
        ",
    )
    .bind(endpoint)
    .bind(method)
    .bind(i64::from(status_code))
    .bind(response_time_ms)
    .execute(pool)
    .await
    .context("Failed to record API usage")?;

    Ok(())
}

/// Request counts and latency per endpoint, busiest first.
pub async fn api_usage_stats(pool: &SqlitePool) -> Result<Vec<EndpointUsage>> {
    sqlx::query_as(
        r"
        SELECT
            endpoint,
            method,
            COUNT(*) AS requests,
            CAST(AVG(response_time_ms) AS REAL) AS avg_response_time,
            MAX(response_time_ms) AS max_response_time
        FROM api_usage
        GROUP BY endpoint, method
        ORDER BY requests DESC, endpoint ASC
        ",
    )
    .fetch_all(pool)
    .await
    .context("Failed to fetch API usage stats")
}
