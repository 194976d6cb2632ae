use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::content::{Subject, Task, TaskType};
use crate::models::feedback::StatusMessage;
use crate::models::progress::{LessonStatus, UserLesson, UserSubject};
use crate::models::user_task::UserTask;

#[derive(Debug, Clone)]
pub struct EnrollOutcome {
    pub user_subject: UserSubject,
    pub message: StatusMessage,
}

#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub user_lesson: UserLesson,
    pub first_user_task_id: Option<Uuid>,
    pub message: StatusMessage,
}

#[derive(Clone)]
pub struct EnrollmentService {
    pool: PgPool,
}

impl EnrollmentService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enrolls a student and creates the chapter and lesson progress rows.
    pub async fn enroll(&self, user_id: Uuid, subject_id: Uuid) -> Result<EnrollOutcome> {
        let mut tx = self.pool.begin().await?;

        let subject = sqlx::query_as::<_, Subject>(r#"SELECT * FROM subjects WHERE id = $1"#)
            .bind(subject_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| Error::NotFound("Subject not found".to_string()))?;

        let created = sqlx::query_as::<_, UserSubject>(
            r#"
            INSERT INTO user_subjects (user_id, subject_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, subject_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(subject.id)
        .fetch_optional(&mut *tx)
        .await?;

        let (user_subject, message) = match created {
            Some(us) => (us, StatusMessage::success("enrolled")),
            None => {
                let existing = sqlx::query_as::<_, UserSubject>(
                    r#"SELECT * FROM user_subjects WHERE user_id = $1 AND subject_id = $2"#,
                )
                .bind(user_id)
                .bind(subject.id)
                .fetch_one(&mut *tx)
                .await?;
                (existing, StatusMessage::info("already_enrolled"))
            }
        };

        // Also picks up chapters and lessons added after the first enrollment.
        sqlx::query(
            r#"
            INSERT INTO user_chapters (user_subject_id, chapter_id)
            SELECT $1, c.id FROM chapters c WHERE c.subject_id = $2
            ON CONFLICT (user_subject_id, chapter_id) DO NOTHING
            "#,
        )
        .bind(user_subject.id)
        .bind(subject.id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO user_lessons (user_subject_id, lesson_id, status)
            SELECT $1, l.id, $3 FROM lessons l WHERE l.subject_id = $2
            ON CONFLICT (user_subject_id, lesson_id) DO NOTHING
            "#,
        )
        .bind(user_subject.id)
        .bind(subject.id)
        .bind(LessonStatus::NotStarted.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            user_id = %user_id,
            subject_id = %subject.id,
            code = %message.code,
            "Enrollment processed"
        );
        Ok(EnrollOutcome {
            user_subject,
            message,
        })
    }

    /// Opens a lesson attempt, creating a user task and answer rows per task.
    pub async fn start_lesson(&self, user_id: Uuid, user_lesson_id: Uuid) -> Result<StartOutcome> {
        let mut tx = self.pool.begin().await?;

        let user_lesson = sqlx::query_as::<_, UserLesson>(
            r#"
            SELECT ul.* FROM user_lessons ul
            JOIN user_subjects us ON us.id = ul.user_subject_id
            WHERE ul.id = $1 AND us.user_id = $2
            FOR UPDATE OF ul
            "#,
        )
        .bind(user_lesson_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::NotFound("Lesson not found".to_string()))?;

        let tasks = sqlx::query_as::<_, Task>(
            r#"SELECT * FROM tasks WHERE lesson_id = $1 ORDER BY "order", id"#,
        )
        .bind(user_lesson.lesson_id)
        .fetch_all(&mut *tx)
        .await?;

        if tasks.is_empty() {
            return Ok(StartOutcome {
                user_lesson,
                first_user_task_id: None,
                message: StatusMessage::warning("lesson_has_no_tasks"),
            });
        }

        let mut first_user_task_id = None;
        for task in &tasks {
            let user_task = get_or_create_user_task(&mut tx, user_lesson.id, task.id).await?;
            if first_user_task_id.is_none() {
                first_user_task_id = Some(user_task.id);
            }
            match task.kind() {
                Some(kind) => create_answer_rows(&mut tx, user_task.id, task.id, kind).await?,
                None => tracing::warn!(task_id = %task.id, task_type = %task.task_type, "Unknown task type"),
            }
        }

        let user_lesson = if user_lesson.lesson_status() == LessonStatus::NotStarted {
            sqlx::query_as::<_, UserLesson>(
                r#"UPDATE user_lessons SET status = $1 WHERE id = $2 RETURNING *"#,
            )
            .bind(LessonStatus::InProgress.as_str())
            .bind(user_lesson.id)
            .fetch_one(&mut *tx)
            .await?
        } else {
            user_lesson
        };

        tx.commit().await?;

        tracing::info!(user_lesson_id = %user_lesson.id, tasks = tasks.len(), "Lesson started");
        Ok(StartOutcome {
            user_lesson,
            first_user_task_id,
            message: StatusMessage::success("lesson_started"),
        })
    }
}

async fn get_or_create_user_task(
    tx: &mut Transaction<'_, Postgres>,
    user_lesson_id: Uuid,
    task_id: Uuid,
) -> Result<UserTask> {
    let inserted = sqlx::query_as::<_, UserTask>(
        r#"
        INSERT INTO user_tasks (user_lesson_id, task_id)
        VALUES ($1, $2)
        ON CONFLICT (user_lesson_id, task_id) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(user_lesson_id)
    .bind(task_id)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(user_task) = inserted {
        return Ok(user_task);
    }

    let existing = sqlx::query_as::<_, UserTask>(
        r#"SELECT * FROM user_tasks WHERE user_lesson_id = $1 AND task_id = $2"#,
    )
    .bind(user_lesson_id)
    .bind(task_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(existing)
}

/// One answer row per content unit of the task; existing rows are kept.
async fn create_answer_rows(
    tx: &mut Transaction<'_, Postgres>,
    user_task_id: Uuid,
    task_id: Uuid,
    kind: TaskType,
) -> Result<()> {
    let sql = match kind {
        TaskType::Video => {
            r#"
            INSERT INTO user_videos (user_task_id, video_id)
            SELECT $1, v.id FROM videos v WHERE v.task_id = $2
            ON CONFLICT (user_task_id, video_id) DO NOTHING
            "#
        }
        TaskType::Written => {
            r#"
            INSERT INTO user_written (user_task_id, written_id)
            SELECT $1, w.id FROM written w WHERE w.task_id = $2
            ON CONFLICT (user_task_id, written_id) DO NOTHING
            "#
        }
        TaskType::TextGap => {
            r#"
            INSERT INTO user_text_gaps (user_task_id, text_gap_id)
            SELECT $1, g.id FROM text_gaps g WHERE g.task_id = $2
            ON CONFLICT (user_task_id, text_gap_id) DO NOTHING
            "#
        }
        TaskType::Test => {
            r#"
            INSERT INTO user_answers (user_task_id, question_id)
            SELECT $1, q.id FROM questions q WHERE q.task_id = $2
            ON CONFLICT (user_task_id, question_id) DO NOTHING
            "#
        }
        TaskType::Matching => {
            r#"
            INSERT INTO user_matchings (user_task_id, pair_id)
            SELECT $1, p.id FROM matching_pairs p WHERE p.task_id = $2
            ON CONFLICT (user_task_id, pair_id) DO NOTHING
            "#
        }
        TaskType::Table => {
            r#"
            INSERT INTO user_table_answers (user_task_id, row_id, column_id)
            SELECT $1, r.id, c.id
            FROM table_rows r
            JOIN table_columns c ON c.task_id = r.task_id
            WHERE r.task_id = $2
            ON CONFLICT (user_task_id, row_id, column_id) DO NOTHING
            "#
        }
    };

    sqlx::query(sql)
        .bind(user_task_id)
        .bind(task_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
