pub mod attendance;
pub mod auth;
pub mod codec;
pub mod config;
pub mod err;
pub mod lessons;
pub mod models;
pub mod qrtoken;
pub mod session;
pub mod storage;

use axum::handler::Handler;
use axum::routing::{get, post};
use axum::{Extension, Router};
use serde::Serialize;
use sqlx::PgPool;

use crate::attendance::Recorder;
use crate::config::Config;
use crate::err::{Error, Fine, Maybe, Nothing};
use crate::qrtoken::QrTokenManager;
use crate::session::SessionManager;
use crate::storage::PgAttendanceStore;

pub type Payload<T> = Result<Maybe<T>, Error>;

pub fn proceeds<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok(Fine(value))
}

pub fn breaks<V>(err: Error) -> Payload<V>
where
    V: Serialize,
{
    Ok(Nothing(err))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let config = Config::from_env()?;

    let pool = PgPool::connect(&config.database_url).await?;
    storage::prepare(&pool).await?;

    // One key per token class, injected here and nowhere else.
    let sessions = SessionManager::new(config.session_key);
    let qr = QrTokenManager::new(config.qr_token_key, config.qr_token_max_age_secs);
    let recorder = Recorder::new(PgAttendanceStore::new(pool.clone()));

    let app = Router::new()
        .route("/auth", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/student/getInfo", get(auth::student_info))
        .route("/teacher/getInfo", get(lessons::teacher_info))
        .route("/teacher/getLesson", get(lessons::get_lesson))
        .route("/teacher/export", get(lessons::export_attendances))
        .route("/lessons/create", post(lessons::create_lesson))
        .route("/lessons/mark", post(lessons::mark_attendance))
        .route("/archive/getLessons", get(lessons::archive_lessons))
        .route("/archive/deleteLesson", post(lessons::delete_lesson))
        .fallback(err::handler404.into_service())
        .layer(Extension(pool))
        .layer(Extension(sessions))
        .layer(Extension(qr))
        .layer(Extension(recorder));

    log::info!(
        "Starting Attendance HTTP Server on http://{}",
        config.bind_addr
    );
    axum::Server::bind(&config.bind_addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
