use async_trait::async_trait;
use sqlx::PgPool;

use crate::attendance::{AttendanceRecord, AttendanceStore};
use crate::err::Error;

/// Creates the schema on startup. The composite primary key on `attendances`
/// is what makes the recorder's check-then-insert race-free.
pub async fn prepare(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id BIGSERIAL PRIMARY KEY,
            login TEXT NOT NULL UNIQUE,
            pass_hash TEXT NOT NULL,
            full_name TEXT NOT NULL,
            role TEXT NOT NULL,
            group_id BIGINT
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS lessons (
            id BIGSERIAL PRIMARY KEY,
            name_lesson TEXT NOT NULL,
            date TEXT NOT NULL,
            type_les TEXT NOT NULL,
            qr_token TEXT NOT NULL DEFAULT '',
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            teacher_id BIGINT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS attendances (
            lesson_id BIGINT NOT NULL,
            student_id BIGINT NOT NULL,
            status INT NOT NULL DEFAULT 1,
            confirmed_at TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (lesson_id, student_id)
        )",
    )
    .execute(pool)
    .await?;

    log::info!("Storage schema ready");
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PgAttendanceStore {
    pool: PgPool,
}

impl PgAttendanceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttendanceStore for PgAttendanceStore {
    async fn try_insert(&self, record: &AttendanceRecord) -> Result<bool, Error> {
        // The unique constraint arbitrates concurrent writers; the loser sees
        // zero affected rows instead of an error.
        let result = sqlx::query(
            "INSERT INTO attendances(lesson_id, student_id, status, confirmed_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (lesson_id, student_id) DO NOTHING",
        )
        .bind(record.lesson_id)
        .bind(record.student_id)
        .bind(record.status)
        .bind(record.confirmed_at)
        .execute(&self.pool)
        .await
        .map_err(Error::from)?;

        Ok(result.rows_affected() == 1)
    }

    async fn find(
        &self,
        lesson_id: i64,
        student_id: i64,
    ) -> Result<Option<AttendanceRecord>, Error> {
        sqlx::query_as::<_, AttendanceRecord>(
            "SELECT lesson_id, student_id, status, confirmed_at
             FROM attendances WHERE lesson_id = $1 AND student_id = $2 LIMIT 1",
        )
        .bind(lesson_id)
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::from)
    }
}
