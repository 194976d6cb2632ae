use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::dto::teacher_dto::{
    AssessmentReport, ReportStatistics, ReportStudentRow, ScoreBands, StudentReport,
    SubjectAverages, SubjectOverview, SubjectReport, TeacherOverview,
};
use crate::error::{Error, Result};
use crate::models::content::{Chapter, Lesson, LessonType, Subject};
use crate::models::progress::{UserChapter, UserLesson, UserSubject};
use crate::models::user::display_name;
use crate::services::aggregation_service::average;

const LOW_BAND_BELOW: i64 = 40;
const HIGH_BAND_FROM: i64 = 85;

/// Quarter filter: 1 to 4, anything else is the first quarter.
pub fn parse_quarter(raw: Option<&str>) -> i16 {
    raw.and_then(|v| v.trim().parse::<i16>().ok())
        .filter(|q| (1..=4).contains(q))
        .unwrap_or(1)
}

/// Average rounded to `dp` places, 0 when there is nothing to average.
pub fn rounded(value: Option<Decimal>, dp: u32) -> Decimal {
    value.map(|v| v.round_dp(dp)).unwrap_or(Decimal::ZERO)
}

fn mean(values: &[Decimal]) -> Decimal {
    average(values).unwrap_or(Decimal::ZERO)
}

pub fn score_bands(percentages: &[Decimal]) -> ScoreBands {
    let low = Decimal::from(LOW_BAND_BELOW);
    let high = Decimal::from(HIGH_BAND_FROM);
    let mut bands = ScoreBands::default();
    for p in percentages {
        if *p < low {
            bands.low += 1;
        } else if *p < high {
            bands.mid += 1;
        } else {
            bands.high += 1;
        }
    }
    bands
}

pub fn overview_entry(row: SubjectAverages) -> SubjectOverview {
    SubjectOverview {
        subject_id: row.subject_id,
        title: row.title,
        students: row.students,
        subject_avg_rating: rounded(row.subject_rating, 0),
        subject_avg_percentage: rounded(row.subject_percentage, 0),
        chapter_avg_rating: rounded(row.chapter_rating, 0),
        chapter_avg_percentage: rounded(row.chapter_percentage, 0),
        lesson_avg_rating: rounded(row.lesson_rating, 0),
        lesson_avg_percentage: rounded(row.lesson_percentage, 0),
    }
}

/// Everything a subject report is computed from.
#[derive(Debug, Clone)]
pub struct ReportInput {
    pub quarter: i16,
    pub chapters: Vec<Chapter>,
    pub lessons: Vec<Lesson>,
    pub max_scores: HashMap<Uuid, i64>,
    pub students: Vec<ReportStudentRow>,
    pub user_subjects: Vec<UserSubject>,
    pub user_chapters: Vec<UserChapter>,
    pub user_lessons: Vec<UserLesson>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportBody {
    pub assessments: Vec<AssessmentReport>,
    pub students: Vec<StudentReport>,
    pub statistics: ReportStatistics,
}

/// Builds the report over the selected students only.
pub fn build_report(input: &ReportInput) -> ReportBody {
    let selected: HashSet<Uuid> = input.students.iter().map(|s| s.user_subject_id).collect();
    let user_subjects: Vec<&UserSubject> = input
        .user_subjects
        .iter()
        .filter(|us| selected.contains(&us.id))
        .collect();
    let user_chapters: Vec<&UserChapter> = input
        .user_chapters
        .iter()
        .filter(|uc| selected.contains(&uc.user_subject_id))
        .collect();
    let user_lessons: Vec<&UserLesson> = input
        .user_lessons
        .iter()
        .filter(|ul| selected.contains(&ul.user_subject_id))
        .collect();
    let lesson_types: HashMap<Uuid, LessonType> =
        input.lessons.iter().map(|l| (l.id, l.kind())).collect();

    let mut assessment_lessons: Vec<&Lesson> = input
        .lessons
        .iter()
        .filter(|l| l.quarter == input.quarter)
        .filter(|l| matches!(l.kind(), LessonType::Chapter | LessonType::Quarter))
        .collect();
    assessment_lessons.sort_by(|a, b| {
        (a.kind() == LessonType::Quarter, a.order).cmp(&(b.kind() == LessonType::Quarter, b.order))
    });

    let assessments = assessment_lessons
        .into_iter()
        .map(|lesson| {
            let rows: Vec<&&UserLesson> = user_lessons
                .iter()
                .filter(|ul| ul.lesson_id == lesson.id)
                .collect();
            let students: HashSet<Uuid> = rows.iter().map(|ul| ul.user_subject_id).collect();
            let percentages: Vec<Decimal> = rows.iter().map(|ul| ul.percentage).collect();
            AssessmentReport {
                lesson_id: lesson.id,
                title: lesson.title.clone(),
                lesson_type: lesson.kind().as_str().to_string(),
                students: students.len() as i64,
                max_score: input.max_scores.get(&lesson.id).copied().unwrap_or(0),
                bands: score_bands(&percentages),
            }
        })
        .collect();

    let students = input
        .students
        .iter()
        .map(|student| {
            let chapters: Vec<&&UserChapter> = user_chapters
                .iter()
                .filter(|uc| uc.user_subject_id == student.user_subject_id)
                .collect();
            let lessons: Vec<&&UserLesson> = user_lessons
                .iter()
                .filter(|ul| ul.user_subject_id == student.user_subject_id)
                .collect();
            let quarter_percentages: Vec<Decimal> = lessons
                .iter()
                .filter(|ul| lesson_types.get(&ul.lesson_id) == Some(&LessonType::Quarter))
                .map(|ul| ul.percentage)
                .collect();
            let chapter_percentages: Vec<Decimal> = chapters.iter().map(|c| c.percentage).collect();
            let chapter_ratings: Vec<Decimal> = chapters.iter().map(|c| c.rating).collect();
            let lesson_percentages: Vec<Decimal> = lessons.iter().map(|l| l.percentage).collect();
            let lesson_ratings: Vec<Decimal> = lessons.iter().map(|l| l.rating).collect();

            StudentReport {
                user_id: student.user_id,
                user_subject_id: student.user_subject_id,
                full_name: full_name(student),
                user_class: student.user_class.clone(),
                quarter_avg_percentage: mean(&quarter_percentages),
                chapter_avg_percentage: mean(&chapter_percentages),
                chapter_avg_rating: mean(&chapter_ratings),
                lesson_avg_percentage: mean(&lesson_percentages),
                lesson_avg_rating: mean(&lesson_ratings),
            }
        })
        .collect();

    let total_students = selected.len();
    let completed_chapters = input
        .chapters
        .iter()
        .filter(|chapter| {
            let done = user_chapters
                .iter()
                .filter(|uc| uc.chapter_id == chapter.id && uc.is_completed)
                .count();
            total_students > 0 && done == total_students
        })
        .count();
    let completed_lessons = input
        .lessons
        .iter()
        .filter(|lesson| {
            let done = user_lessons
                .iter()
                .filter(|ul| ul.lesson_id == lesson.id && ul.is_completed)
                .count();
            total_students > 0 && done == total_students
        })
        .count();

    let statistics = ReportStatistics {
        subject_avg_percentage: mean(&user_subjects.iter().map(|us| us.percentage).collect::<Vec<_>>()),
        subject_avg_rating: mean(&user_subjects.iter().map(|us| us.rating).collect::<Vec<_>>()),
        chapter_avg_percentage: mean(&user_chapters.iter().map(|c| c.percentage).collect::<Vec<_>>()),
        chapter_avg_rating: mean(&user_chapters.iter().map(|c| c.rating).collect::<Vec<_>>()),
        lesson_avg_percentage: mean(&user_lessons.iter().map(|l| l.percentage).collect::<Vec<_>>()),
        lesson_avg_rating: mean(&user_lessons.iter().map(|l| l.rating).collect::<Vec<_>>()),
        total_chapters: input.chapters.len() as i64,
        completed_chapters: completed_chapters as i64,
        total_lessons: input.lessons.len() as i64,
        completed_lessons: completed_lessons as i64,
    };

    ReportBody {
        assessments,
        students,
        statistics,
    }
}

fn full_name(student: &ReportStudentRow) -> String {
    display_name(&student.username, &student.first_name, &student.last_name)
}

#[derive(Clone)]
pub struct StatisticsService {
    pool: PgPool,
}

impl StatisticsService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn overview(&self) -> Result<TeacherOverview> {
        let rows = sqlx::query_as::<_, SubjectAverages>(
            r#"
            SELECT s.id AS subject_id, s.title,
                (SELECT COUNT(*) FROM user_subjects us WHERE us.subject_id = s.id) AS students,
                (SELECT AVG(us.rating) FROM user_subjects us WHERE us.subject_id = s.id) AS subject_rating,
                (SELECT AVG(us.percentage) FROM user_subjects us WHERE us.subject_id = s.id) AS subject_percentage,
                (SELECT AVG(uc.rating) FROM user_chapters uc
                    JOIN user_subjects us ON us.id = uc.user_subject_id
                    WHERE us.subject_id = s.id) AS chapter_rating,
                (SELECT AVG(uc.percentage) FROM user_chapters uc
                    JOIN user_subjects us ON us.id = uc.user_subject_id
                    WHERE us.subject_id = s.id) AS chapter_percentage,
                (SELECT AVG(ul.rating) FROM user_lessons ul
                    JOIN user_subjects us ON us.id = ul.user_subject_id
                    WHERE us.subject_id = s.id) AS lesson_rating,
                (SELECT AVG(ul.percentage) FROM user_lessons ul
                    JOIN user_subjects us ON us.id = ul.user_subject_id
                    WHERE us.subject_id = s.id) AS lesson_percentage
            FROM subjects s
            ORDER BY s.title
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let enrollments_count =
            sqlx::query_scalar::<_, i64>(r#"SELECT COUNT(*) FROM user_subjects"#)
                .fetch_one(&self.pool)
                .await?;

        Ok(TeacherOverview {
            subjects_count: rows.len() as i64,
            enrollments_count,
            subjects: rows.into_iter().map(overview_entry).collect(),
        })
    }

    pub async fn subject_report(
        &self,
        subject_id: Uuid,
        class: Option<String>,
        quarter: i16,
    ) -> Result<SubjectReport> {
        let subject = sqlx::query_as::<_, Subject>(r#"SELECT * FROM subjects WHERE id = $1"#)
            .bind(subject_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("Subject not found".to_string()))?;
        let class = class.filter(|c| !c.trim().is_empty());

        let students = sqlx::query_as::<_, ReportStudentRow>(
            r#"
            SELECT us.id AS user_subject_id, u.id AS user_id, u.username,
                   u.first_name, u.last_name, u.user_class
            FROM user_subjects us
            JOIN users u ON u.id = us.user_id
            WHERE us.subject_id = $1 AND ($2::text IS NULL OR u.user_class = $2)
            ORDER BY u.last_name, u.first_name, u.username
            "#,
        )
        .bind(subject.id)
        .bind(class.as_deref())
        .fetch_all(&self.pool)
        .await?;

        let available_classes = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT u.user_class
            FROM user_subjects us
            JOIN users u ON u.id = us.user_id
            WHERE us.subject_id = $1 AND u.user_class IS NOT NULL
            ORDER BY u.user_class
            "#,
        )
        .bind(subject.id)
        .fetch_all(&self.pool)
        .await?;

        let chapters = sqlx::query_as::<_, Chapter>(
            r#"SELECT * FROM chapters WHERE subject_id = $1 ORDER BY "order", id"#,
        )
        .bind(subject.id)
        .fetch_all(&self.pool)
        .await?;

        let lessons = sqlx::query_as::<_, Lesson>(
            r#"SELECT * FROM lessons WHERE subject_id = $1 ORDER BY quarter, "order", id"#,
        )
        .bind(subject.id)
        .fetch_all(&self.pool)
        .await?;

        let max_scores: HashMap<Uuid, i64> = sqlx::query_as::<_, (Uuid, i64)>(
            r#"
            SELECT t.lesson_id, COALESCE(SUM(t.rating), 0)::bigint
            FROM tasks t
            JOIN lessons l ON l.id = t.lesson_id
            WHERE l.subject_id = $1
            GROUP BY t.lesson_id
            "#,
        )
        .bind(subject.id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .collect();

        let user_subjects = sqlx::query_as::<_, UserSubject>(
            r#"SELECT * FROM user_subjects WHERE subject_id = $1"#,
        )
        .bind(subject.id)
        .fetch_all(&self.pool)
        .await?;

        let user_chapters = sqlx::query_as::<_, UserChapter>(
            r#"
            SELECT uc.* FROM user_chapters uc
            JOIN user_subjects us ON us.id = uc.user_subject_id
            WHERE us.subject_id = $1
            "#,
        )
        .bind(subject.id)
        .fetch_all(&self.pool)
        .await?;

        let user_lessons = sqlx::query_as::<_, UserLesson>(
            r#"
            SELECT ul.* FROM user_lessons ul
            JOIN user_subjects us ON us.id = ul.user_subject_id
            WHERE us.subject_id = $1
            "#,
        )
        .bind(subject.id)
        .fetch_all(&self.pool)
        .await?;

        let body = build_report(&ReportInput {
            quarter,
            chapters,
            lessons,
            max_scores,
            students,
            user_subjects,
            user_chapters,
            user_lessons,
        });

        tracing::debug!(
            subject_id = %subject.id,
            quarter,
            students = body.students.len(),
            "Subject report built"
        );

        Ok(SubjectReport {
            subject_id: subject.id,
            title: subject.title,
            selected_class: class,
            selected_quarter: quarter,
            available_classes,
            assessments: body.assessments,
            students: body.students,
            statistics: body.statistics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(v: i64) -> Decimal {
        Decimal::from(v)
    }

    #[test]
    fn quarter_filter_falls_back_to_first() {
        assert_eq!(parse_quarter(None), 1);
        assert_eq!(parse_quarter(Some("3")), 3);
        assert_eq!(parse_quarter(Some("abc")), 1);
        assert_eq!(parse_quarter(Some("7")), 1);
        assert_eq!(parse_quarter(Some(" 4 ")), 4);
    }

    #[test]
    fn bands_split_at_forty_and_eighty_five() {
        let bands = score_bands(&[d(0), d(39), d(40), d(84), d(85), d(100)]);
        assert_eq!(bands, ScoreBands { low: 2, mid: 2, high: 2 });
        assert_eq!(score_bands(&[]), ScoreBands::default());
    }

    #[test]
    fn overview_rounds_to_whole_numbers() {
        let entry = overview_entry(SubjectAverages {
            subject_id: Uuid::new_v4(),
            title: "Algebra".into(),
            students: 3,
            subject_rating: Some(Decimal::new(3667, 3)),
            subject_percentage: Some(Decimal::new(5549, 2)),
            chapter_rating: None,
            chapter_percentage: None,
            lesson_rating: Some(Decimal::new(72, 1)),
            lesson_percentage: Some(d(80)),
        });
        assert_eq!(entry.subject_avg_rating, d(4));
        assert_eq!(entry.subject_avg_percentage, d(55));
        assert_eq!(entry.chapter_avg_rating, Decimal::ZERO);
        assert_eq!(entry.lesson_avg_rating, d(7));
    }

    struct Fixture {
        input: ReportInput,
        assessment_id: Uuid,
        quarter_lesson_id: Uuid,
    }

    fn fixture() -> Fixture {
        let subject_id = Uuid::new_v4();
        let chapter = Chapter {
            id: Uuid::new_v4(),
            subject_id,
            title: "Numbers".into(),
            order: 0,
        };
        let lesson = |title: &str, kind: &str, quarter: i16, order: i32| Lesson {
            id: Uuid::new_v4(),
            subject_id,
            chapter_id: chapter.id,
            title: title.into(),
            lesson_type: kind.into(),
            quarter,
            order,
        };
        let regular = lesson("Intro", "lesson", 1, 0);
        let formative = lesson("Check 1", "chapter", 1, 1);
        let summative = lesson("Term exam", "quarter", 1, 2);
        let next_term = lesson("Term 2 check", "chapter", 2, 0);

        let students: Vec<ReportStudentRow> = ["7A", "7B"]
            .iter()
            .enumerate()
            .map(|(i, class)| ReportStudentRow {
                user_subject_id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                username: format!("student{}", i),
                first_name: String::new(),
                last_name: String::new(),
                user_class: Some(class.to_string()),
            })
            .collect();

        let user_subjects = students
            .iter()
            .map(|s| UserSubject {
                id: s.user_subject_id,
                user_id: s.user_id,
                subject_id,
                percentage: d(50),
                rating: d(4),
                is_completed: false,
                created_at: None,
                completed_at: None,
            })
            .collect();

        let user_chapters = students
            .iter()
            .map(|s| UserChapter {
                id: Uuid::new_v4(),
                user_subject_id: s.user_subject_id,
                chapter_id: chapter.id,
                percentage: d(50),
                rating: d(8),
                is_completed: false,
            })
            .collect();

        let progress = |s: &ReportStudentRow, l: &Lesson, pct: i64, done: bool| UserLesson {
            id: Uuid::new_v4(),
            user_subject_id: s.user_subject_id,
            lesson_id: l.id,
            status: if done { "finished" } else { "in_progress" }.into(),
            rating: d(pct / 10),
            percentage: d(pct),
            is_completed: done,
            completed_at: None,
        };
        let user_lessons = vec![
            progress(&students[0], &regular, 100, true),
            progress(&students[1], &regular, 60, true),
            progress(&students[0], &formative, 90, true),
            progress(&students[1], &formative, 30, true),
            progress(&students[0], &summative, 60, true),
            progress(&students[1], &summative, 0, false),
        ];

        let mut max_scores = HashMap::new();
        max_scores.insert(formative.id, 20);

        Fixture {
            assessment_id: formative.id,
            quarter_lesson_id: summative.id,
            input: ReportInput {
                quarter: 1,
                chapters: vec![chapter.clone()],
                lessons: vec![summative, regular, formative, next_term],
                max_scores,
                students,
                user_subjects,
                user_chapters,
                user_lessons,
            },
        }
    }

    #[test]
    fn report_lists_quarter_assessments_chapter_first() {
        let f = fixture();
        let body = build_report(&f.input);
        assert_eq!(body.assessments.len(), 2);
        assert_eq!(body.assessments[0].lesson_id, f.assessment_id);
        assert_eq!(body.assessments[0].max_score, 20);
        assert_eq!(body.assessments[0].bands, ScoreBands { low: 1, mid: 0, high: 1 });
        assert_eq!(body.assessments[1].lesson_id, f.quarter_lesson_id);
        assert_eq!(body.assessments[1].max_score, 0);
        assert_eq!(body.assessments[1].students, 2);
    }

    #[test]
    fn report_averages_each_student() {
        let f = fixture();
        let body = build_report(&f.input);
        let first = &body.students[0];
        assert_eq!(first.full_name, "student0");
        assert_eq!(first.quarter_avg_percentage, d(60));
        assert_eq!(first.lesson_avg_percentage, Decimal::new(8333, 2));
        assert_eq!(first.chapter_avg_rating, d(8));
    }

    #[test]
    fn completed_by_all_counts_only_fully_finished_lessons() {
        let f = fixture();
        let body = build_report(&f.input);
        assert_eq!(body.statistics.total_lessons, 4);
        assert_eq!(body.statistics.completed_lessons, 2);
        assert_eq!(body.statistics.total_chapters, 1);
        assert_eq!(body.statistics.completed_chapters, 0);
        assert_eq!(body.statistics.subject_avg_rating, d(4));
    }

    #[test]
    fn class_filter_narrows_every_figure() {
        let mut f = fixture();
        f.input.students.retain(|s| s.user_class.as_deref() == Some("7B"));
        let body = build_report(&f.input);
        assert_eq!(body.students.len(), 1);
        assert_eq!(body.assessments[0].students, 1);
        assert_eq!(body.assessments[0].bands, ScoreBands { low: 1, mid: 0, high: 0 });
        assert_eq!(body.statistics.completed_lessons, 2);
    }

    #[test]
    fn empty_selection_completes_nothing() {
        let mut f = fixture();
        f.input.students.clear();
        let body = build_report(&f.input);
        assert_eq!(body.statistics.completed_lessons, 0);
        assert_eq!(body.statistics.lesson_avg_rating, Decimal::ZERO);
    }
}
