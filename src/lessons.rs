use axum::extract::{Query, TypedHeader};
use axum::headers::Cookie;
use axum::http::header::{HeaderMap, HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::attendance::{RecordOutcome, Recorder};
use crate::auth::{require_role, require_session};
use crate::err::Error;
use crate::models::Lesson;
use crate::qrtoken::QrTokenManager;
use crate::session::{Role, SessionManager};
use crate::storage::PgAttendanceStore;
use crate::{breaks, proceeds, Payload};

const LESSON_COLUMNS: &str =
    "id, name_lesson, date, type_les, qr_token, is_active, teacher_id";

#[derive(Debug, Clone, Deserialize)]
pub struct LessonRequest {
    pub name: String,
    pub date: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "isActive", default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Serialize)]
pub struct LessonCreated {
    message: String,
    #[serde(rename = "qrToken")]
    qr_token: String,
}

pub async fn create_lesson(
    cookies: Option<TypedHeader<Cookie>>,
    Extension(pg): Extension<PgPool>,
    Extension(sessions): Extension<SessionManager>,
    Extension(qr): Extension<QrTokenManager>,
    Json(lesson): Json<LessonRequest>,
) -> Payload<LessonCreated> {
    let session = match require_session(&cookies, &sessions) {
        Ok(session) => session,
        Err(err) => return breaks(err),
    };
    if let Err(err) = require_role(&session, Role::Teacher) {
        return breaks(err);
    }

    if lesson.name.is_empty() || lesson.date.is_empty() || lesson.kind.is_empty() {
        return breaks(Error::InvalidPayload {
            message: "`name`, `date` and `type` are required".to_string(),
        });
    }

    // The owner is whoever holds the session, never a field of the request.
    let (lesson_id,): (i64,) = sqlx::query_as(
        "INSERT INTO lessons(name_lesson, date, type_les, is_active, teacher_id)
         VALUES ($1, $2, $3, $4, $5) RETURNING id",
    )
    .bind(&lesson.name)
    .bind(&lesson.date)
    .bind(&lesson.kind)
    .bind(lesson.is_active)
    .bind(session.user_id)
    .fetch_one(&pg)
    .await
    .map_err(Error::from)?;

    let token = qr
        .issue(
            lesson_id,
            &lesson.name,
            &lesson.date,
            &lesson.kind,
            &session.full_name,
        )
        .map_err(Error::from)?;

    sqlx::query("UPDATE lessons SET qr_token = $1 WHERE id = $2")
        .bind(&token)
        .bind(lesson_id)
        .execute(&pg)
        .await
        .map_err(Error::from)?;

    log::info!("Teacher {} created lesson {}", session.login, lesson_id);
    proceeds(LessonCreated {
        message: format!(
            "Lesson '{}' created successfully with ID: {}",
            lesson.name, lesson_id
        ),
        qr_token: token,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarkParams {
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarkResponse {
    message: String,
    #[serde(rename = "lessonId")]
    lesson_id: i64,
    #[serde(rename = "nameLesson")]
    name_lesson: String,
    date: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "teacherName")]
    teacher_name: String,
    #[serde(rename = "alreadyMarked")]
    already_marked: bool,
    #[serde(rename = "confirmedAt")]
    confirmed_at: DateTime<Utc>,
}

pub async fn mark_attendance(
    cookies: Option<TypedHeader<Cookie>>,
    Query(params): Query<MarkParams>,
    Extension(sessions): Extension<SessionManager>,
    Extension(qr): Extension<QrTokenManager>,
    Extension(recorder): Extension<Recorder<PgAttendanceStore>>,
) -> Payload<MarkResponse> {
    let session = match require_session(&cookies, &sessions) {
        Ok(session) => session,
        Err(err) => return breaks(err),
    };
    if let Err(err) = require_role(&session, Role::Student) {
        return breaks(err);
    }

    let claims = match qr.resolve(&params.token) {
        Ok(claims) => claims,
        Err(failure) => return breaks(Error::from(failure)),
    };

    let outcome = recorder.record(&session, claims.id).await?;
    let (record, already_marked) = match outcome {
        RecordOutcome::Marked(record) => (record, false),
        RecordOutcome::AlreadyMarked(record) => (record, true),
    };

    proceeds(MarkResponse {
        message: if already_marked {
            "Attendance was already marked".to_string()
        } else {
            "Attendance marked successfully".to_string()
        },
        lesson_id: claims.id,
        name_lesson: claims.name,
        date: claims.date,
        kind: claims.kind,
        teacher_name: claims.teacher_name,
        already_marked,
        confirmed_at: record.confirmed_at,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct TeacherInfo {
    message: String,
    fullname: String,
    lessons: Vec<Lesson>,
}

async fn lessons_by_activity(
    pg: &PgPool,
    teacher_id: i64,
    is_active: bool,
) -> Result<Vec<Lesson>, Error> {
    sqlx::query_as::<_, Lesson>(&format!(
        "SELECT {} FROM lessons WHERE teacher_id = $1 AND is_active = $2 ORDER BY id",
        LESSON_COLUMNS
    ))
    .bind(teacher_id)
    .bind(is_active)
    .fetch_all(pg)
    .await
    .map_err(Error::from)
}

pub async fn teacher_info(
    cookies: Option<TypedHeader<Cookie>>,
    Extension(pg): Extension<PgPool>,
    Extension(sessions): Extension<SessionManager>,
) -> Payload<TeacherInfo> {
    let session = match require_session(&cookies, &sessions) {
        Ok(session) => session,
        Err(err) => return breaks(err),
    };
    if let Err(err) = require_role(&session, Role::Teacher) {
        return breaks(err);
    }

    let lessons = lessons_by_activity(&pg, session.user_id, true).await?;
    proceeds(TeacherInfo {
        message: "Lessons retrieved successfully".to_string(),
        fullname: session.full_name,
        lessons,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveInfo {
    message: String,
    lessons: Vec<Lesson>,
}

pub async fn archive_lessons(
    cookies: Option<TypedHeader<Cookie>>,
    Extension(pg): Extension<PgPool>,
    Extension(sessions): Extension<SessionManager>,
) -> Payload<ArchiveInfo> {
    let session = match require_session(&cookies, &sessions) {
        Ok(session) => session,
        Err(err) => return breaks(err),
    };
    if let Err(err) = require_role(&session, Role::Teacher) {
        return breaks(err);
    }

    let lessons = lessons_by_activity(&pg, session.user_id, false).await?;
    proceeds(ArchiveInfo {
        message: "Archive lessons retrieved successfully".to_string(),
        lessons,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct LessonIdParams {
    #[serde(rename = "lessonId")]
    pub lesson_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LessonDetails {
    message: String,
    #[serde(flatten)]
    lesson: Lesson,
}

async fn fetch_lesson(pg: &PgPool, lesson_id: i64) -> Result<Option<Lesson>, Error> {
    sqlx::query_as::<_, Lesson>(&format!(
        "SELECT {} FROM lessons WHERE id = $1 LIMIT 1",
        LESSON_COLUMNS
    ))
    .bind(lesson_id)
    .fetch_optional(pg)
    .await
    .map_err(Error::from)
}

pub async fn get_lesson(
    cookies: Option<TypedHeader<Cookie>>,
    Query(params): Query<LessonIdParams>,
    Extension(pg): Extension<PgPool>,
    Extension(sessions): Extension<SessionManager>,
) -> Payload<LessonDetails> {
    if let Err(err) = require_session(&cookies, &sessions) {
        return breaks(err);
    }
    if params.lesson_id <= 0 {
        return breaks(Error::InvalidPayload {
            message: "Lesson ID must be positive number".to_string(),
        });
    }

    match fetch_lesson(&pg, params.lesson_id).await? {
        Some(lesson) => proceeds(LessonDetails {
            message: "Lesson retrieved successfully".to_string(),
            lesson,
        }),
        None => breaks(Error::NotFound {
            message: "Lesson not found".to_string(),
        }),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LessonDeleted {
    message: String,
}

pub async fn delete_lesson(
    cookies: Option<TypedHeader<Cookie>>,
    Query(params): Query<LessonIdParams>,
    Extension(pg): Extension<PgPool>,
    Extension(sessions): Extension<SessionManager>,
) -> Payload<LessonDeleted> {
    let session = match require_session(&cookies, &sessions) {
        Ok(session) => session,
        Err(err) => return breaks(err),
    };
    if let Err(err) = require_role(&session, Role::Teacher) {
        return breaks(err);
    }
    if params.lesson_id <= 0 {
        return breaks(Error::InvalidPayload {
            message: "Lesson ID must be positive number".to_string(),
        });
    }

    let lesson = match fetch_lesson(&pg, params.lesson_id).await? {
        Some(lesson) => lesson,
        None => {
            return breaks(Error::NotFound {
                message: "Lesson not found".to_string(),
            })
        }
    };
    if lesson.teacher_id != session.user_id {
        return breaks(Error::access_denied());
    }
    if lesson.is_active {
        return breaks(Error::InvalidPayload {
            message: "Lesson is still active".to_string(),
        });
    }

    sqlx::query("DELETE FROM lessons WHERE id = $1 AND teacher_id = $2")
        .bind(lesson.id)
        .bind(session.user_id)
        .execute(&pg)
        .await
        .map_err(Error::from)?;

    log::info!("Teacher {} deleted lesson {}", session.login, lesson.id);
    proceeds(LessonDeleted {
        message: "Lesson deleted successfully".to_string(),
    })
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ExportRow {
    full_name: String,
    group_id: Option<i64>,
    status: i32,
    confirmed_at: DateTime<Utc>,
}

fn build_csv(rows: &[ExportRow]) -> String {
    // BOM so spreadsheet software picks up UTF-8.
    let mut csv = String::from("\u{feff}");
    csv.push_str("Full name;Group;Status;Confirmed at\n");
    for row in rows {
        let group = row
            .group_id
            .map(|id| id.to_string())
            .unwrap_or_default();
        let status = if row.status == 1 { "present" } else { "absent" };
        csv.push_str(&format!(
            "{};{};{};{}\n",
            row.full_name,
            group,
            status,
            row.confirmed_at.format("%Y-%m-%d %H:%M:%S")
        ));
    }
    csv
}

pub async fn export_attendances(
    cookies: Option<TypedHeader<Cookie>>,
    Query(params): Query<LessonIdParams>,
    Extension(pg): Extension<PgPool>,
    Extension(sessions): Extension<SessionManager>,
) -> Result<Response, Error> {
    let session = require_session(&cookies, &sessions)?;
    require_role(&session, Role::Teacher)?;
    if params.lesson_id <= 0 {
        return Err(Error::InvalidPayload {
            message: "Lesson ID must be positive number".to_string(),
        });
    }

    let lesson = fetch_lesson(&pg, params.lesson_id)
        .await?
        .ok_or(Error::NotFound {
            message: "Lesson not found".to_string(),
        })?;
    // Export is owner-scoped.
    if lesson.teacher_id != session.user_id {
        return Err(Error::access_denied());
    }

    let rows = sqlx::query_as::<_, ExportRow>(
        "SELECT u.full_name, u.group_id, a.status, a.confirmed_at
         FROM attendances a
         JOIN users u ON a.student_id = u.id
         WHERE a.lesson_id = $1
         ORDER BY u.group_id, u.full_name",
    )
    .bind(lesson.id)
    .fetch_all(&pg)
    .await
    .map_err(Error::from)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/csv; charset=utf-8"),
    );
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!(
            "attachment; filename=attendances_{}.csv",
            lesson.id
        ))?,
    );

    Ok((headers, build_csv(&rows)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn csv_layout() {
        let rows = vec![
            ExportRow {
                full_name: "P. Petrov".to_string(),
                group_id: Some(101),
                status: 1,
                confirmed_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 15, 0).unwrap(),
            },
            ExportRow {
                full_name: "S. Sidorova".to_string(),
                group_id: Some(101),
                status: 0,
                confirmed_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 20, 0).unwrap(),
            },
        ];

        let csv = build_csv(&rows);
        assert!(csv.starts_with('\u{feff}'));
        assert!(csv.contains("Full name;Group;Status;Confirmed at\n"));
        assert!(csv.contains("P. Petrov;101;present;2024-05-01 10:15:00\n"));
        assert!(csv.contains("S. Sidorova;101;absent;2024-05-01 10:20:00\n"));
    }

    #[test]
    fn empty_export_is_just_the_header() {
        let csv = build_csv(&[]);
        assert_eq!(csv, "\u{feff}Full name;Group;Status;Confirmed at\n");
    }

    #[test]
    fn lesson_request_defaults_to_active() {
        let req: LessonRequest = serde_json::from_str(
            r#"{"name": "Algorithms", "date": "2024-05-01", "type": "Lecture"}"#,
        )
        .unwrap();
        assert!(req.is_active);
    }
}
