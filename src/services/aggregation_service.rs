use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::content::{Lesson, LessonType};
use crate::models::feedback::StatusMessage;
use crate::models::progress::{LessonStatus, UserLesson};
use crate::services::scoring;

/// Achieved and maximum rating over a set of tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, FromRow)]
pub struct Totals {
    pub achieved: Decimal,
    pub maximum: Decimal,
}

impl Totals {
    pub fn new(achieved: Decimal, maximum: Decimal) -> Self {
        Self { achieved, maximum }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LessonResult {
    pub rating: Decimal,
    pub percentage: Decimal,
}

/// Rating and percentage of a finished lesson.
///
/// `quarter_work` is only read for quarter assessments: the totals of every
/// regular and chapter lesson of the same quarter.
pub fn lesson_result(kind: LessonType, own: Totals, quarter_work: Totals) -> LessonResult {
    let rating = own.achieved;
    let percentage = match kind {
        LessonType::Lesson => scoring::clamp_percentage(rating * Decimal::TEN),
        LessonType::Chapter => scoring::ratio_percentage(own.achieved, own.maximum),
        LessonType::Quarter => {
            let half = Decimal::ONE_HUNDRED / Decimal::TWO;
            let coursework = ratio(quarter_work.achieved, quarter_work.maximum);
            let assessment = ratio(own.achieved, own.maximum);
            scoring::clamp_percentage(half * coursework + half * assessment)
        }
    };
    LessonResult {
        rating,
        percentage: percentage.round_dp(2),
    }
}

fn ratio(part: Decimal, whole: Decimal) -> Decimal {
    if whole <= Decimal::ZERO {
        Decimal::ZERO
    } else {
        (part / whole).max(Decimal::ZERO).min(Decimal::ONE)
    }
}

/// Completion percentage and flag for `completed` out of `total` children.
pub fn completion(completed: i64, total: i64) -> (Decimal, bool) {
    let percentage = scoring::ratio_percentage(Decimal::from(completed), Decimal::from(total));
    (percentage, total > 0 && completed == total)
}

pub fn average(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    let sum: Decimal = values.iter().copied().sum();
    Some((sum / Decimal::from(values.len() as i64)).round_dp(2))
}

/// Final subject grade from the percentages of finished quarter assessments;
/// 0 while none is finished.
pub fn subject_rating(quarter_percentages: &[Decimal]) -> Decimal {
    average(quarter_percentages)
        .map(scoring::subject_grade)
        .unwrap_or(Decimal::ZERO)
}

#[derive(Debug, Clone)]
pub struct FinishOutcome {
    pub user_lesson: UserLesson,
    pub message: StatusMessage,
}

/// Message explaining why a lesson attempt must be left untouched, if any.
pub fn finish_refusal(is_completed: bool, status: LessonStatus) -> Option<StatusMessage> {
    if is_completed {
        Some(StatusMessage::info("lesson_already_finished"))
    } else if status == LessonStatus::NotStarted {
        Some(StatusMessage::warning("lesson_not_started"))
    } else {
        None
    }
}

#[derive(Debug, FromRow)]
struct ChildCounts {
    total: i64,
    completed: i64,
}

#[derive(Clone)]
pub struct AggregationService {
    pool: PgPool,
}

impl AggregationService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Closes a lesson attempt and rolls its rating up to chapter and subject.
    pub async fn finish_lesson(&self, user_id: Uuid, user_lesson_id: Uuid) -> Result<FinishOutcome> {
        let mut tx = self.pool.begin().await?;

        let user_subject_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT us.id FROM user_subjects us
            JOIN user_lessons ul ON ul.user_subject_id = us.id
            WHERE ul.id = $1 AND us.user_id = $2
            FOR UPDATE OF us
            "#,
        )
        .bind(user_lesson_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::NotFound("Lesson not found".to_string()))?;

        let user_lesson = lock_user_lesson(&mut tx, user_subject_id, user_lesson_id).await?;

        if let Some(message) = finish_refusal(user_lesson.is_completed, user_lesson.lesson_status()) {
            tracing::debug!(user_lesson_id = %user_lesson.id, code = %message.code, "Finish skipped");
            return Ok(FinishOutcome { user_lesson, message });
        }

        let updated = roll_up_lesson(&mut tx, &user_lesson).await?;
        tx.commit().await?;

        Ok(FinishOutcome {
            user_lesson: updated,
            message: StatusMessage::success("lesson_finished"),
        })
    }
}

/// Recomputes a finished lesson after one of its task ratings changed.
/// Unfinished lessons are left for the student's own finish.
///
/// The caller must already hold the lock on the owning `user_subjects` row.
pub(crate) async fn refresh_finished_lesson(
    tx: &mut Transaction<'_, Postgres>,
    user_subject_id: Uuid,
    user_lesson_id: Uuid,
) -> Result<Option<UserLesson>> {
    let user_lesson = lock_user_lesson(tx, user_subject_id, user_lesson_id).await?;
    if !user_lesson.is_completed {
        return Ok(None);
    }
    roll_up_lesson(tx, &user_lesson).await.map(Some)
}

async fn lock_user_lesson(
    tx: &mut Transaction<'_, Postgres>,
    user_subject_id: Uuid,
    user_lesson_id: Uuid,
) -> Result<UserLesson> {
    let user_lesson = sqlx::query_as::<_, UserLesson>(
        r#"SELECT * FROM user_lessons WHERE id = $1 AND user_subject_id = $2 FOR UPDATE"#,
    )
    .bind(user_lesson_id)
    .bind(user_subject_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| Error::NotFound("Lesson not found".to_string()))?;
    Ok(user_lesson)
}

/// Scores the lesson from its task ratings, marks it finished and updates
/// the owning chapter and subject.
async fn roll_up_lesson(
    tx: &mut Transaction<'_, Postgres>,
    user_lesson: &UserLesson,
) -> Result<UserLesson> {
    let lesson = sqlx::query_as::<_, Lesson>(r#"SELECT * FROM lessons WHERE id = $1"#)
        .bind(user_lesson.lesson_id)
        .fetch_one(&mut **tx)
        .await?;

    let own = lesson_totals(tx, user_lesson.id, lesson.id).await?;
    let kind = lesson.kind();
    let quarter_work = if kind == LessonType::Quarter {
        quarter_coursework_totals(tx, user_lesson.user_subject_id, lesson.quarter).await?
    } else {
        Totals::default()
    };
    let result = lesson_result(kind, own, quarter_work);

    let updated = sqlx::query_as::<_, UserLesson>(
        r#"
        UPDATE user_lessons
        SET rating = $1, percentage = $2, is_completed = TRUE, status = $3,
            completed_at = COALESCE(completed_at, NOW())
        WHERE id = $4
        RETURNING *
        "#,
    )
    .bind(result.rating)
    .bind(result.percentage)
    .bind(LessonStatus::Finished.as_str())
    .bind(user_lesson.id)
    .fetch_one(&mut **tx)
    .await?;

    recompute_chapter(tx, updated.user_subject_id, lesson.chapter_id).await?;
    recompute_subject(tx, updated.user_subject_id).await?;

    tracing::info!(
        user_lesson_id = %updated.id,
        lesson_type = kind.as_str(),
        rating = %updated.rating,
        percentage = %updated.percentage,
        "Lesson scored"
    );
    Ok(updated)
}

async fn lesson_totals(
    tx: &mut Transaction<'_, Postgres>,
    user_lesson_id: Uuid,
    lesson_id: Uuid,
) -> Result<Totals> {
    let totals = sqlx::query_as::<_, Totals>(
        r#"
        SELECT COALESCE(SUM(ut.rating), 0)::numeric AS achieved,
               COALESCE(SUM(t.rating), 0)::numeric AS maximum
        FROM tasks t
        LEFT JOIN user_tasks ut ON ut.task_id = t.id AND ut.user_lesson_id = $1
        WHERE t.lesson_id = $2
        "#,
    )
    .bind(user_lesson_id)
    .bind(lesson_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(totals)
}

async fn quarter_coursework_totals(
    tx: &mut Transaction<'_, Postgres>,
    user_subject_id: Uuid,
    quarter: i16,
) -> Result<Totals> {
    let totals = sqlx::query_as::<_, Totals>(
        r#"
        SELECT COALESCE(SUM(ut.rating), 0)::numeric AS achieved,
               COALESCE(SUM(t.rating), 0)::numeric AS maximum
        FROM user_lessons ul
        JOIN lessons l ON l.id = ul.lesson_id
        JOIN tasks t ON t.lesson_id = l.id
        LEFT JOIN user_tasks ut ON ut.task_id = t.id AND ut.user_lesson_id = ul.id
        WHERE ul.user_subject_id = $1
          AND l.quarter = $2
          AND l.lesson_type IN ('lesson', 'chapter')
        "#,
    )
    .bind(user_subject_id)
    .bind(quarter)
    .fetch_one(&mut **tx)
    .await?;
    Ok(totals)
}

async fn recompute_chapter(
    tx: &mut Transaction<'_, Postgres>,
    user_subject_id: Uuid,
    chapter_id: Uuid,
) -> Result<()> {
    let counts = sqlx::query_as::<_, ChildCounts>(
        r#"
        SELECT COUNT(*) AS total,
               COUNT(*) FILTER (WHERE ul.is_completed) AS completed
        FROM user_lessons ul
        JOIN lessons l ON l.id = ul.lesson_id
        WHERE ul.user_subject_id = $1 AND l.chapter_id = $2
        "#,
    )
    .bind(user_subject_id)
    .bind(chapter_id)
    .fetch_one(&mut **tx)
    .await?;

    let lesson_ratings: Vec<Decimal> = sqlx::query_scalar(
        r#"
        SELECT ul.rating FROM user_lessons ul
        JOIN lessons l ON l.id = ul.lesson_id
        WHERE ul.user_subject_id = $1 AND l.chapter_id = $2 AND l.lesson_type = 'lesson'
        "#,
    )
    .bind(user_subject_id)
    .bind(chapter_id)
    .fetch_all(&mut **tx)
    .await?;

    let (percentage, is_completed) = completion(counts.completed, counts.total);
    let rating = average(&lesson_ratings).unwrap_or(Decimal::ZERO);

    sqlx::query(
        r#"
        UPDATE user_chapters
        SET percentage = $1, rating = $2, is_completed = $3
        WHERE user_subject_id = $4 AND chapter_id = $5
        "#,
    )
    .bind(percentage)
    .bind(rating)
    .bind(is_completed)
    .bind(user_subject_id)
    .bind(chapter_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn recompute_subject(tx: &mut Transaction<'_, Postgres>, user_subject_id: Uuid) -> Result<()> {
    let counts = sqlx::query_as::<_, ChildCounts>(
        r#"
        SELECT COUNT(*) AS total,
               COUNT(*) FILTER (WHERE is_completed) AS completed
        FROM user_chapters
        WHERE user_subject_id = $1
        "#,
    )
    .bind(user_subject_id)
    .fetch_one(&mut **tx)
    .await?;

    let quarter_percentages: Vec<Decimal> = sqlx::query_scalar(
        r#"
        SELECT ul.percentage FROM user_lessons ul
        JOIN lessons l ON l.id = ul.lesson_id
        WHERE ul.user_subject_id = $1 AND l.lesson_type = 'quarter' AND ul.is_completed
        "#,
    )
    .bind(user_subject_id)
    .fetch_all(&mut **tx)
    .await?;

    let (percentage, is_completed) = completion(counts.completed, counts.total);
    let rating = subject_rating(&quarter_percentages);

    sqlx::query(
        r#"
        UPDATE user_subjects
        SET percentage = $1, rating = $2, is_completed = $3,
            completed_at = CASE WHEN $3 THEN COALESCE(completed_at, NOW()) ELSE completed_at END
        WHERE id = $4
        "#,
    )
    .bind(percentage)
    .bind(rating)
    .bind(is_completed)
    .bind(user_subject_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::feedback::MessageLevel;

    fn d(v: i64) -> Decimal {
        Decimal::from(v)
    }

    #[test]
    fn finished_or_unstarted_lessons_are_left_alone() {
        let done = finish_refusal(true, LessonStatus::Finished).expect("refused");
        assert_eq!(done.code, "lesson_already_finished");
        assert_eq!(done.level, MessageLevel::Info);

        let fresh = finish_refusal(false, LessonStatus::NotStarted).expect("refused");
        assert_eq!(fresh.level, MessageLevel::Warning);

        assert!(finish_refusal(false, LessonStatus::InProgress).is_none());
    }

    #[test]
    fn regular_lesson_percentage_is_ten_times_rating() {
        let result = lesson_result(LessonType::Lesson, Totals::new(d(7), d(10)), Totals::default());
        assert_eq!(result.rating, d(7));
        assert_eq!(result.percentage, d(70));

        let over = lesson_result(LessonType::Lesson, Totals::new(d(14), d(14)), Totals::default());
        assert_eq!(over.percentage, d(100));
    }

    #[test]
    fn chapter_lesson_uses_its_own_maximum() {
        let result = lesson_result(LessonType::Chapter, Totals::new(d(9), d(12)), Totals::default());
        assert_eq!(result.percentage, d(75));

        let empty = lesson_result(LessonType::Chapter, Totals::new(d(0), d(0)), Totals::default());
        assert_eq!(empty.percentage, Decimal::ZERO);
    }

    #[test]
    fn quarter_lesson_blends_coursework_and_assessment() {
        // coursework 30/40 = 0.75, assessment 10/20 = 0.5 -> 37.5 + 25
        let result = lesson_result(
            LessonType::Quarter,
            Totals::new(d(10), d(20)),
            Totals::new(d(30), d(40)),
        );
        assert_eq!(result.rating, d(10));
        assert_eq!(result.percentage, Decimal::new(625, 1));
    }

    #[test]
    fn quarter_lesson_without_coursework_counts_assessment_half() {
        let result = lesson_result(
            LessonType::Quarter,
            Totals::new(d(20), d(20)),
            Totals::default(),
        );
        assert_eq!(result.percentage, d(50));
    }

    #[test]
    fn completion_requires_every_child() {
        assert_eq!(completion(2, 4), (d(50), false));
        assert_eq!(completion(4, 4), (d(100), true));
        assert_eq!(completion(0, 0), (Decimal::ZERO, false));
    }

    #[test]
    fn subject_rating_from_quarter_average() {
        assert_eq!(subject_rating(&[d(30), d(70)]), d(3));
        assert_eq!(subject_rating(&[d(90), d(80)]), d(5));
        assert_eq!(subject_rating(&[]), Decimal::ZERO);
    }

    #[test]
    fn average_rounds_to_two_places() {
        assert_eq!(average(&[d(1), d(2), d(2)]), Some(Decimal::new(167, 2)));
        assert_eq!(average(&[]), None);
    }
}
