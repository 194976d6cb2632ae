use std::collections::{BTreeSet, HashMap};

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::dto::student_dto::{MatchingLeft, SubmitTaskResponse, TaskContent, TaskView};
use crate::error::{Error, Result};
use crate::models::content::{
    AnswerOption, MatchingPair, Question, TableCell, TableColumn, TableRow, Task, TaskType,
    TextGap, Video, Written,
};
use crate::models::feedback::StatusMessage;
use crate::models::progress::UserLesson;
use crate::models::user_task::{
    UserAnswer, UserMatching, UserTableAnswer, UserTask, UserTextGap, UserVideo, UserWritten,
};
use crate::services::aggregation_service::refresh_finished_lesson;
use crate::services::grading_service::TaskAnswers;
use crate::utils::form::FormData;

const OWNED_USER_TASK: &str = r#"
    SELECT ut.* FROM user_tasks ut
    JOIN user_lessons ul ON ul.id = ut.user_lesson_id
    JOIN user_subjects us ON us.id = ul.user_subject_id
    WHERE ut.id = $1 AND us.user_id = $2
"#;

/// Stored teacher grade, with the lesson when it was recomputed.
#[derive(Debug, Clone, Serialize)]
pub struct ManualGrade {
    pub user_task: UserTask,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_lesson: Option<UserLesson>,
}

#[derive(Clone)]
pub struct SubmissionService {
    pool: PgPool,
}

impl SubmissionService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Grades a submitted form and persists the answer rows and task rating atomically.
    pub async fn submit(
        &self,
        user_id: Uuid,
        user_task_id: Uuid,
        form: &FormData,
    ) -> Result<SubmitTaskResponse> {
        let mut tx = self.pool.begin().await?;

        let locked = format!("{} FOR UPDATE OF ut", OWNED_USER_TASK);
        let user_task = sqlx::query_as::<_, UserTask>(&locked)
            .bind(user_task_id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| Error::NotFound("Task not found".to_string()))?;

        let task = fetch_task(&mut tx, user_task.task_id).await?;

        let Some(kind) = task.kind() else {
            tracing::warn!(task_id = %task.id, task_type = %task.task_type, "Submission for unknown task type ignored");
            return Ok(SubmitTaskResponse {
                user_task_id: user_task.id,
                rating: user_task.rating,
                max_rating: task.rating,
                is_completed: user_task.is_completed,
                message: StatusMessage::warning("unsupported_task_type"),
            });
        };

        let mut answers = load_answers(&mut tx, user_task.id, task.id, kind).await?;
        let grade = answers.grade(form, Decimal::from(task.rating));
        persist_answers(&mut tx, &answers).await?;

        let updated = sqlx::query_as::<_, UserTask>(
            r#"
            UPDATE user_tasks
            SET rating = COALESCE($1, rating),
                is_completed = $2,
                submitted_at = NOW()
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(grade.rating)
        .bind(grade.completed)
        .bind(user_task.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            user_task_id = %updated.id,
            task_type = kind.as_str(),
            rating = %updated.rating,
            completed = updated.is_completed,
            code = %grade.message.code,
            "Task submitted"
        );

        Ok(SubmitTaskResponse {
            user_task_id: updated.id,
            rating: updated.rating,
            max_rating: task.rating,
            is_completed: updated.is_completed,
            message: grade.message,
        })
    }

    pub async fn get_task_view(&self, user_id: Uuid, user_task_id: Uuid) -> Result<TaskView> {
        let mut tx = self.pool.begin().await?;

        let user_task = sqlx::query_as::<_, UserTask>(OWNED_USER_TASK)
            .bind(user_task_id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| Error::NotFound("Task not found".to_string()))?;
        let task = fetch_task(&mut tx, user_task.task_id).await?;

        let content = match task.kind() {
            Some(kind) => load_content(&mut tx, &user_task, kind).await?,
            None => TaskContent::Unsupported,
        };
        tx.commit().await?;

        Ok(TaskView {
            user_task,
            task,
            content,
        })
    }

    /// Teacher review of a written task. The rating must lie within the task maximum.
    ///
    /// When the lesson was already finished its rating, chapter and subject
    /// are recomputed in the same transaction.
    pub async fn grade_manually(&self, user_task_id: Uuid, rating: Decimal) -> Result<ManualGrade> {
        let mut tx = self.pool.begin().await?;

        // Enrollment first: the same lock order as finishing a lesson.
        let user_subject_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT us.id FROM user_subjects us
            JOIN user_lessons ul ON ul.user_subject_id = us.id
            JOIN user_tasks ut ON ut.user_lesson_id = ul.id
            WHERE ut.id = $1
            FOR UPDATE OF us
            "#,
        )
        .bind(user_task_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::NotFound("Task not found".to_string()))?;

        let user_task = sqlx::query_as::<_, UserTask>(
            r#"SELECT * FROM user_tasks WHERE id = $1 FOR UPDATE"#,
        )
        .bind(user_task_id)
        .fetch_one(&mut *tx)
        .await?;
        let task = fetch_task(&mut tx, user_task.task_id).await?;

        if task.kind() != Some(TaskType::Written) {
            return Err(Error::BadRequest(
                "Only written tasks can be graded manually".to_string(),
            ));
        }
        let rating = validate_manual_rating(rating, task.rating)?;

        let updated = sqlx::query_as::<_, UserTask>(
            r#"
            UPDATE user_tasks SET rating = $1, is_completed = TRUE
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(rating)
        .bind(user_task.id)
        .fetch_one(&mut *tx)
        .await?;

        let user_lesson =
            refresh_finished_lesson(&mut tx, user_subject_id, updated.user_lesson_id).await?;

        tx.commit().await?;

        tracing::info!(
            user_task_id = %updated.id,
            rating = %updated.rating,
            lesson_refreshed = user_lesson.is_some(),
            "Written task graded"
        );
        Ok(ManualGrade {
            user_task: updated,
            user_lesson,
        })
    }
}

pub fn validate_manual_rating(rating: Decimal, max: i32) -> Result<Decimal> {
    let rating = rating.round_dp(2);
    if rating < Decimal::ZERO || rating > Decimal::from(max) {
        return Err(Error::BadRequest(format!(
            "Rating must be between 0 and {}",
            max
        )));
    }
    Ok(rating)
}

/// Checked state per row and column, in header order.
pub fn table_matrix(
    rows: &[TableRow],
    columns: &[TableColumn],
    values: &HashMap<(Uuid, Uuid), bool>,
) -> Vec<Vec<bool>> {
    rows.iter()
        .map(|row| {
            columns
                .iter()
                .map(|col| values.get(&(row.id, col.id)).copied().unwrap_or(false))
                .collect()
        })
        .collect()
}

/// Distinct right-hand items in a stable order that does not reveal the pairing.
pub fn right_choices(pairs: &[MatchingPair]) -> Vec<String> {
    pairs
        .iter()
        .map(|p| p.right_item.trim().to_string())
        .collect::<BTreeSet<String>>()
        .into_iter()
        .collect()
}

async fn fetch_task(tx: &mut Transaction<'_, Postgres>, task_id: Uuid) -> Result<Task> {
    let task = sqlx::query_as::<_, Task>(r#"SELECT * FROM tasks WHERE id = $1"#)
        .bind(task_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| Error::NotFound("Task not found".to_string()))?;
    Ok(task)
}

async fn load_answers(
    tx: &mut Transaction<'_, Postgres>,
    user_task_id: Uuid,
    task_id: Uuid,
    kind: TaskType,
) -> Result<TaskAnswers> {
    let answers = match kind {
        TaskType::Video => TaskAnswers::Video(user_videos(tx, user_task_id).await?),
        TaskType::Written => TaskAnswers::Written(user_written(tx, user_task_id).await?),
        TaskType::TextGap => {
            let gaps = text_gaps(tx, task_id).await?;
            TaskAnswers::TextGap {
                answers: user_text_gaps(tx, user_task_id).await?,
                gaps: gaps.into_iter().map(|g| (g.id, g)).collect(),
            }
        }
        TaskType::Test => {
            let questions = questions(tx, task_id).await?;
            TaskAnswers::Test {
                answers: user_answers(tx, user_task_id).await?,
                questions: questions.into_iter().map(|q| (q.id, q)).collect(),
                options: answer_options(tx, task_id).await?,
            }
        }
        TaskType::Matching => {
            let pairs = matching_pairs(tx, task_id).await?;
            TaskAnswers::Matching {
                answers: user_matchings(tx, user_task_id).await?,
                pairs: pairs.into_iter().map(|p| (p.id, p)).collect(),
            }
        }
        TaskType::Table => TaskAnswers::Table {
            answers: user_table_answers(tx, user_task_id).await?,
            cells: table_cells(tx, task_id).await?,
        },
    };
    Ok(answers)
}

async fn persist_answers(tx: &mut Transaction<'_, Postgres>, answers: &TaskAnswers) -> Result<()> {
    match answers {
        TaskAnswers::Video(rows) => {
            for row in rows {
                sqlx::query(
                    r#"UPDATE user_videos SET watched_seconds = $1, is_completed = $2 WHERE id = $3"#,
                )
                .bind(row.watched_seconds)
                .bind(row.is_completed)
                .bind(row.id)
                .execute(&mut **tx)
                .await?;
            }
        }
        TaskAnswers::Written(rows) => {
            for row in rows {
                sqlx::query(
                    r#"UPDATE user_written SET answer = $1, is_submitted = $2 WHERE id = $3"#,
                )
                .bind(&row.answer)
                .bind(row.is_submitted)
                .bind(row.id)
                .execute(&mut **tx)
                .await?;
            }
        }
        TaskAnswers::TextGap { answers, .. } => {
            for row in answers {
                sqlx::query(
                    r#"UPDATE user_text_gaps SET answer = $1, is_correct = $2 WHERE id = $3"#,
                )
                .bind(&row.answer)
                .bind(row.is_correct)
                .bind(row.id)
                .execute(&mut **tx)
                .await?;
            }
        }
        TaskAnswers::Test { answers, .. } => {
            for row in answers {
                sqlx::query(r#"DELETE FROM user_answer_options WHERE user_answer_id = $1"#)
                    .bind(row.id)
                    .execute(&mut **tx)
                    .await?;
                if row.option_ids.is_empty() {
                    continue;
                }
                sqlx::query(
                    r#"
                    INSERT INTO user_answer_options (user_answer_id, option_id)
                    SELECT $1, UNNEST($2::uuid[])
                    ON CONFLICT DO NOTHING
                    "#,
                )
                .bind(row.id)
                .bind(&row.option_ids)
                .execute(&mut **tx)
                .await?;
            }
        }
        TaskAnswers::Matching { answers, .. } => {
            for row in answers {
                sqlx::query(
                    r#"UPDATE user_matchings SET selected_right = $1, is_correct = $2 WHERE id = $3"#,
                )
                .bind(&row.selected_right)
                .bind(row.is_correct)
                .bind(row.id)
                .execute(&mut **tx)
                .await?;
            }
        }
        TaskAnswers::Table { answers, .. } => {
            for row in answers {
                sqlx::query(
                    r#"UPDATE user_table_answers SET checked = $1, is_submitted = $2 WHERE id = $3"#,
                )
                .bind(row.checked)
                .bind(row.is_submitted)
                .bind(row.id)
                .execute(&mut **tx)
                .await?;
            }
        }
    }
    Ok(())
}

async fn load_content(
    tx: &mut Transaction<'_, Postgres>,
    user_task: &UserTask,
    kind: TaskType,
) -> Result<TaskContent> {
    let task_id = user_task.task_id;
    let content = match kind {
        TaskType::Video => TaskContent::Video {
            videos: sqlx::query_as::<_, Video>(
                r#"SELECT * FROM videos WHERE task_id = $1 ORDER BY "order", id"#,
            )
            .bind(task_id)
            .fetch_all(&mut **tx)
            .await?,
            answers: user_videos(tx, user_task.id).await?,
        },
        TaskType::Written => TaskContent::Written {
            prompts: sqlx::query_as::<_, Written>(
                r#"SELECT * FROM written WHERE task_id = $1 ORDER BY id"#,
            )
            .bind(task_id)
            .fetch_all(&mut **tx)
            .await?,
            answers: user_written(tx, user_task.id).await?,
        },
        TaskType::TextGap => TaskContent::TextGap {
            gaps: text_gaps(tx, task_id).await?,
            answers: user_text_gaps(tx, user_task.id).await?,
        },
        TaskType::Test => TaskContent::Test {
            questions: questions(tx, task_id).await?,
            options: answer_options(tx, task_id).await?,
            answers: user_answers(tx, user_task.id).await?,
        },
        TaskType::Matching => {
            let pairs = matching_pairs(tx, task_id).await?;
            let by_id: HashMap<Uuid, &MatchingPair> = pairs.iter().map(|p| (p.id, p)).collect();
            let items = user_matchings(tx, user_task.id)
                .await?
                .into_iter()
                .map(|m| MatchingLeft {
                    user_matching_id: m.id,
                    left_item: by_id
                        .get(&m.pair_id)
                        .map(|p| p.left_item.clone())
                        .unwrap_or_default(),
                    selected_right: m.selected_right,
                })
                .collect();
            TaskContent::Matching {
                items,
                right_choices: right_choices(&pairs),
            }
        }
        TaskType::Table => {
            let rows = sqlx::query_as::<_, TableRow>(
                r#"SELECT * FROM table_rows WHERE task_id = $1 ORDER BY "order", id"#,
            )
            .bind(task_id)
            .fetch_all(&mut **tx)
            .await?;
            let columns = sqlx::query_as::<_, TableColumn>(
                r#"SELECT * FROM table_columns WHERE task_id = $1 ORDER BY "order", id"#,
            )
            .bind(task_id)
            .fetch_all(&mut **tx)
            .await?;
            let checked: HashMap<(Uuid, Uuid), bool> = user_table_answers(tx, user_task.id)
                .await?
                .into_iter()
                .map(|a| ((a.row_id, a.column_id), a.checked))
                .collect();
            let correct = if user_task.is_completed {
                let cells: HashMap<(Uuid, Uuid), bool> = table_cells(tx, task_id)
                    .await?
                    .into_iter()
                    .map(|c| ((c.row_id, c.column_id), c.correct))
                    .collect();
                Some(table_matrix(&rows, &columns, &cells))
            } else {
                None
            };
            TaskContent::Table {
                answers: table_matrix(&rows, &columns, &checked),
                correct,
                rows,
                columns,
            }
        }
    };
    Ok(content)
}

async fn user_videos(tx: &mut Transaction<'_, Postgres>, user_task_id: Uuid) -> Result<Vec<UserVideo>> {
    let rows = sqlx::query_as::<_, UserVideo>(
        r#"
        SELECT uv.* FROM user_videos uv
        JOIN videos v ON v.id = uv.video_id
        WHERE uv.user_task_id = $1
        ORDER BY v."order", uv.id
        "#,
    )
    .bind(user_task_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows)
}

async fn user_written(tx: &mut Transaction<'_, Postgres>, user_task_id: Uuid) -> Result<Vec<UserWritten>> {
    let rows = sqlx::query_as::<_, UserWritten>(
        r#"SELECT * FROM user_written WHERE user_task_id = $1 ORDER BY id"#,
    )
    .bind(user_task_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows)
}

async fn user_text_gaps(tx: &mut Transaction<'_, Postgres>, user_task_id: Uuid) -> Result<Vec<UserTextGap>> {
    let rows = sqlx::query_as::<_, UserTextGap>(
        r#"SELECT * FROM user_text_gaps WHERE user_task_id = $1 ORDER BY id"#,
    )
    .bind(user_task_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows)
}

async fn text_gaps(tx: &mut Transaction<'_, Postgres>, task_id: Uuid) -> Result<Vec<TextGap>> {
    let rows = sqlx::query_as::<_, TextGap>(r#"SELECT * FROM text_gaps WHERE task_id = $1 ORDER BY id"#)
        .bind(task_id)
        .fetch_all(&mut **tx)
        .await?;
    Ok(rows)
}

/// Answer rows with their currently selected option ids attached.
async fn user_answers(tx: &mut Transaction<'_, Postgres>, user_task_id: Uuid) -> Result<Vec<UserAnswer>> {
    let mut rows = sqlx::query_as::<_, UserAnswer>(
        r#"
        SELECT ua.* FROM user_answers ua
        JOIN questions q ON q.id = ua.question_id
        WHERE ua.user_task_id = $1
        ORDER BY q."order", ua.id
        "#,
    )
    .bind(user_task_id)
    .fetch_all(&mut **tx)
    .await?;

    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let selected = sqlx::query_as::<_, (Uuid, Uuid)>(
        r#"SELECT user_answer_id, option_id FROM user_answer_options WHERE user_answer_id = ANY($1)"#,
    )
    .bind(&ids)
    .fetch_all(&mut **tx)
    .await?;

    let mut by_answer: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for (answer_id, option_id) in selected {
        by_answer.entry(answer_id).or_default().push(option_id);
    }
    for row in rows.iter_mut() {
        row.option_ids = by_answer.remove(&row.id).unwrap_or_default();
    }
    Ok(rows)
}

async fn questions(tx: &mut Transaction<'_, Postgres>, task_id: Uuid) -> Result<Vec<Question>> {
    let rows = sqlx::query_as::<_, Question>(
        r#"SELECT * FROM questions WHERE task_id = $1 ORDER BY "order", id"#,
    )
    .bind(task_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows)
}

async fn answer_options(tx: &mut Transaction<'_, Postgres>, task_id: Uuid) -> Result<Vec<AnswerOption>> {
    let rows = sqlx::query_as::<_, AnswerOption>(
        r#"
        SELECT ao.* FROM answer_options ao
        JOIN questions q ON q.id = ao.question_id
        WHERE q.task_id = $1
        ORDER BY q."order", ao.id
        "#,
    )
    .bind(task_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows)
}

async fn user_matchings(tx: &mut Transaction<'_, Postgres>, user_task_id: Uuid) -> Result<Vec<UserMatching>> {
    let rows = sqlx::query_as::<_, UserMatching>(
        r#"SELECT * FROM user_matchings WHERE user_task_id = $1 ORDER BY id"#,
    )
    .bind(user_task_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows)
}

async fn matching_pairs(tx: &mut Transaction<'_, Postgres>, task_id: Uuid) -> Result<Vec<MatchingPair>> {
    let rows = sqlx::query_as::<_, MatchingPair>(
        r#"SELECT * FROM matching_pairs WHERE task_id = $1 ORDER BY id"#,
    )
    .bind(task_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows)
}

async fn user_table_answers(
    tx: &mut Transaction<'_, Postgres>,
    user_task_id: Uuid,
) -> Result<Vec<UserTableAnswer>> {
    let rows = sqlx::query_as::<_, UserTableAnswer>(
        r#"SELECT * FROM user_table_answers WHERE user_task_id = $1"#,
    )
    .bind(user_task_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows)
}

async fn table_cells(tx: &mut Transaction<'_, Postgres>, task_id: Uuid) -> Result<Vec<TableCell>> {
    let rows = sqlx::query_as::<_, TableCell>(
        r#"
        SELECT tc.* FROM table_cells tc
        JOIN table_rows r ON r.id = tc.row_id
        WHERE r.task_id = $1
        "#,
    )
    .bind(task_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows)
}
