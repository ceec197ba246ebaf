use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub login: String,
    pub pass_hash: String,
    pub full_name: String,
    pub role: String,
    pub group_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Lesson {
    pub id: i64,
    pub name_lesson: String,
    pub date: String,
    pub type_les: String,
    pub qr_token: String,
    pub is_active: bool,
    pub teacher_id: i64,
}
