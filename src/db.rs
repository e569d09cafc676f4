use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::feedback::NewFeedback;

/// How long a request waits for a pooled connection before failing
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Postgres SQLSTATE for `undefined_table`
const UNDEFINED_TABLE: &str = "42P01";

const CREATE_FEEDBACK_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS feedback (
        id SERIAL PRIMARY KEY,
        name VARCHAR(255),
        email VARCHAR(255),
        message TEXT NOT NULL,
        is_anonymous BOOLEAN DEFAULT false,
        user_experience_rating INTEGER CHECK (user_experience_rating >= 1 AND user_experience_rating <= 5),
        ease_of_use_rating INTEGER CHECK (ease_of_use_rating >= 1 AND ease_of_use_rating <= 5),
        translation_usefulness INTEGER CHECK (translation_usefulness >= 1 AND translation_usefulness <= 5),
        analysis_usefulness INTEGER CHECK (analysis_usefulness >= 1 AND analysis_usefulness <= 5),
        would_recommend VARCHAR(20) CHECK (would_recommend IN ('Yes', 'No', 'Maybe')),
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    )";

const FEEDBACK_COLUMNS: &str = "
    id, name, email, message,
    COALESCE(is_anonymous, false) AS is_anonymous,
    user_experience_rating, ease_of_use_rating,
    translation_usefulness, analysis_usefulness,
    would_recommend, created_at";

/// A stored feedback row
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, serde::Serialize)]
pub struct FeedbackEntry {
    pub id: i32,
    pub name: Option<String>,
    pub email: Option<String>,
    pub message: String,
    pub is_anonymous: bool,
    pub user_experience_rating: Option<i32>,
    pub ease_of_use_rating: Option<i32>,
    pub translation_usefulness: Option<i32>,
    pub analysis_usefulness: Option<i32>,
    pub would_recommend: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    schema_ready: Arc<AtomicBool>,
}

impl Database {
    /// Connect to Postgres and make sure the feedback table exists
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let db = Self::from_pool(pool);
        db.ensure_schema().await?;
        Ok(db)
    }

    /// Build a pool that connects on first use.
    ///
    /// Startup does not fail when the database is briefly unreachable; the
    /// table is created by the first write instead.
    pub fn connect_lazy(database_url: &str) -> Result<Self> {
        Self::connect_lazy_with_timeout(database_url, DEFAULT_ACQUIRE_TIMEOUT)
    }

    /// Like [`Database::connect_lazy`], failing queries after `acquire_timeout`
    /// when no connection can be obtained.
    pub fn connect_lazy_with_timeout(database_url: &str, acquire_timeout: Duration) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(acquire_timeout)
            .connect_lazy(database_url)
            .context("Invalid DATABASE_URL")?;
        Ok(Self::from_pool(pool))
    }

    fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create the feedback table if it does not exist (idempotent)
    pub async fn ensure_schema(&self) -> Result<()> {
        if self.schema_ready.load(Ordering::Acquire) {
            return Ok(());
        }

        sqlx::query(CREATE_FEEDBACK_TABLE)
            .execute(&self.pool)
            .await
            .context("Failed to create feedback table")?;

        self.schema_ready.store(true, Ordering::Release);
        info!("Feedback table ready");
        Ok(())
    }

    /// Insert a validated submission and return the stored row
    pub async fn save_feedback(&self, feedback: &NewFeedback) -> Result<FeedbackEntry> {
        self.ensure_schema().await?;

        let query = format!(
            "INSERT INTO feedback (
                name, email, message, is_anonymous,
                user_experience_rating, ease_of_use_rating,
                translation_usefulness, analysis_usefulness,
                would_recommend
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {}",
            FEEDBACK_COLUMNS
        );

        sqlx::query_as::<_, FeedbackEntry>(&query)
            .bind(&feedback.name)
            .bind(&feedback.email)
            .bind(&feedback.message)
            .bind(feedback.is_anonymous)
            .bind(feedback.ratings.user_experience)
            .bind(feedback.ratings.ease_of_use)
            .bind(feedback.ratings.translation_usefulness)
            .bind(feedback.ratings.analysis_usefulness)
            .bind(feedback.would_recommend.map(|r| r.as_str()))
            .fetch_one(&self.pool)
            .await
            .context("Failed to save feedback")
    }

    /// All feedback, newest first
    pub async fn list_feedback(&self) -> Result<Vec<FeedbackEntry>> {
        let query = format!(
            "SELECT {} FROM feedback ORDER BY created_at DESC, id DESC",
            FEEDBACK_COLUMNS
        );

        sqlx::query_as::<_, FeedbackEntry>(&query)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch feedback")
    }

    pub async fn feedback_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM feedback")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count feedback")?;
        Ok(count)
    }
}

/// Whether `error` was caused by querying a table that does not exist
pub fn is_missing_table(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<sqlx::Error>(),
            Some(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some(UNDEFINED_TABLE)
        )
    })
}
