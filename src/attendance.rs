use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::err::Error;
use crate::session::{Role, Session};

/// One check-in row. Created on the first successful scan for a
/// `(lesson, student)` pair; never updated or deleted afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct AttendanceRecord {
    pub lesson_id: i64,
    pub student_id: i64,
    pub status: i32,
    pub confirmed_at: DateTime<Utc>,
}

/// Storage seam for attendance rows. Implementations must make `try_insert`
/// atomic with the duplicate check: two concurrent writers for the same pair
/// must not both succeed.
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// Inserts unless a row for `(lesson_id, student_id)` already exists.
    /// Returns whether this call created the row.
    async fn try_insert(&self, record: &AttendanceRecord) -> Result<bool, Error>;

    async fn find(&self, lesson_id: i64, student_id: i64)
        -> Result<Option<AttendanceRecord>, Error>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Marked(AttendanceRecord),
    /// A rescan. Carries the original row, so the student sees the same
    /// confirmation as on the first scan.
    AlreadyMarked(AttendanceRecord),
}

#[derive(Clone)]
pub struct Recorder<S> {
    store: S,
}

impl<S: AttendanceStore> Recorder<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Marks attendance for the authenticated student. Idempotent per
    /// `(lesson_id, student_id)`: only the first call transitions the pair to
    /// marked, every later call reports `AlreadyMarked`.
    pub async fn record(
        &self,
        identity: &Session,
        lesson_id: i64,
    ) -> Result<RecordOutcome, Error> {
        if identity.role != Role::Student {
            return Err(Error::access_denied());
        }

        let record = AttendanceRecord {
            lesson_id,
            student_id: identity.user_id,
            status: 1,
            confirmed_at: Utc::now(),
        };

        if self.store.try_insert(&record).await? {
            log::info!(
                "Attendance marked: lesson {} student {}",
                lesson_id,
                identity.user_id
            );
            return Ok(RecordOutcome::Marked(record));
        }

        // Lost the insert race or this is a rescan; either way the first
        // writer's row is the answer.
        match self.store.find(lesson_id, identity.user_id).await? {
            Some(existing) => Ok(RecordOutcome::AlreadyMarked(existing)),
            None => Err(Error::InternalError {
                kind: "StorageError",
                message: "Attendance row missing after duplicate insert".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::KEY_SIZE;
    use crate::qrtoken::{QrTokenKey, QrTokenManager, DEFAULT_MAX_AGE_SECS};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct MemoryStore {
        rows: Arc<Mutex<HashMap<(i64, i64), AttendanceRecord>>>,
    }

    #[async_trait]
    impl AttendanceStore for MemoryStore {
        async fn try_insert(&self, record: &AttendanceRecord) -> Result<bool, Error> {
            let mut rows = self.rows.lock().unwrap();
            let key = (record.lesson_id, record.student_id);
            if rows.contains_key(&key) {
                return Ok(false);
            }
            rows.insert(key, record.clone());
            Ok(true)
        }

        async fn find(
            &self,
            lesson_id: i64,
            student_id: i64,
        ) -> Result<Option<AttendanceRecord>, Error> {
            Ok(self.rows.lock().unwrap().get(&(lesson_id, student_id)).cloned())
        }
    }

    fn student(user_id: i64) -> Session {
        Session {
            user_id,
            login: format!("student{}", user_id),
            role: Role::Student,
            full_name: "P. Petrov".to_string(),
            group_id: Some(101),
        }
    }

    fn teacher() -> Session {
        Session {
            user_id: 3,
            login: "a.ivanov".to_string(),
            role: Role::Teacher,
            full_name: "A. Ivanov".to_string(),
            group_id: None,
        }
    }

    #[tokio::test]
    async fn first_mark_then_already_marked() {
        let recorder = Recorder::new(MemoryStore::default());

        let first = recorder.record(&student(7), 42).await.unwrap();
        let original = match first {
            RecordOutcome::Marked(record) => record,
            other => panic!("expected Marked, got {:?}", other),
        };

        let second = recorder.record(&student(7), 42).await.unwrap();
        match second {
            RecordOutcome::AlreadyMarked(record) => assert_eq!(record, original),
            other => panic!("expected AlreadyMarked, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn separate_students_each_get_marked() {
        let recorder = Recorder::new(MemoryStore::default());
        for id in [7, 8] {
            assert!(matches!(
                recorder.record(&student(id), 42).await.unwrap(),
                RecordOutcome::Marked(_)
            ));
        }
    }

    #[tokio::test]
    async fn teacher_cannot_record() {
        let recorder = Recorder::new(MemoryStore::default());
        assert!(matches!(
            recorder.record(&teacher(), 42).await,
            Err(Error::Forbidden { .. })
        ));
    }

    #[tokio::test]
    async fn concurrent_scans_mark_exactly_once() {
        let store = MemoryStore::default();
        let recorder = Recorder::new(store.clone());

        let a = {
            let recorder = recorder.clone();
            tokio::spawn(async move { recorder.record(&student(7), 42).await.unwrap() })
        };
        let b = {
            let recorder = recorder.clone();
            tokio::spawn(async move { recorder.record(&student(7), 42).await.unwrap() })
        };

        let outcomes = [a.await.unwrap(), b.await.unwrap()];
        let marked = outcomes
            .iter()
            .filter(|o| matches!(o, RecordOutcome::Marked(_)))
            .count();
        assert_eq!(marked, 1);
        assert_eq!(store.rows.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn scan_scenario_via_qr_token() {
        let manager = QrTokenManager::new(QrTokenKey([4u8; KEY_SIZE]), DEFAULT_MAX_AGE_SECS);
        let token = manager
            .issue(42, "Algorithms", "2024-05-01", "Lecture", "A. Ivanov")
            .unwrap();
        let claims = manager.resolve(&token).unwrap();

        let recorder = Recorder::new(MemoryStore::default());
        let first = recorder.record(&student(7), claims.id).await.unwrap();
        let second = recorder.record(&student(7), claims.id).await.unwrap();

        match (first, second) {
            (RecordOutcome::Marked(a), RecordOutcome::AlreadyMarked(b)) => {
                assert_eq!(a, b);
                assert_eq!(a.lesson_id, 42);
                assert_eq!(a.student_id, 7);
                assert_eq!(a.status, 1);
            }
            other => panic!("unexpected outcomes: {:?}", other),
        }
    }
}
