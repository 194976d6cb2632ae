use std::collections::HashMap;

use sqlx::PgPool;
use uuid::Uuid;

use crate::dto::student_dto::{
    CatalogEntry, ChapterOutline, ChapterProgress, EnrolledSubject, LessonProgress, SubjectDetail,
    SubjectProgress,
};
use crate::error::{Error, Result};
use crate::models::content::{Chapter, Lesson, Subject};
use crate::models::progress::{UserChapter, UserLesson, UserSubject};

#[derive(Clone)]
pub struct ProgressService {
    pool: PgPool,
}

impl ProgressService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Every subject, each paired with the student's enrollment when there is one.
    pub async fn catalog(&self, user_id: Uuid) -> Result<Vec<CatalogEntry>> {
        let subjects = sqlx::query_as::<_, Subject>(r#"SELECT * FROM subjects ORDER BY title, id"#)
            .fetch_all(&self.pool)
            .await?;
        let user_subjects = sqlx::query_as::<_, UserSubject>(
            r#"SELECT * FROM user_subjects WHERE user_id = $1"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(pair_with_enrollment(subjects, user_subjects))
    }

    /// Subject outline by chapter, whether or not the student is enrolled.
    pub async fn subject_detail(&self, user_id: Uuid, subject_id: Uuid) -> Result<SubjectDetail> {
        let subject = sqlx::query_as::<_, Subject>(r#"SELECT * FROM subjects WHERE id = $1"#)
            .bind(subject_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("Subject not found".to_string()))?;

        let user_subject = sqlx::query_as::<_, UserSubject>(
            r#"SELECT * FROM user_subjects WHERE user_id = $1 AND subject_id = $2"#,
        )
        .bind(user_id)
        .bind(subject.id)
        .fetch_optional(&self.pool)
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

        Ok(SubjectDetail {
            chapters: outline(chapters, lessons),
            subject,
            user_subject,
        })
    }

    pub async fn list_subjects(&self, user_id: Uuid) -> Result<Vec<EnrolledSubject>> {
        let subjects = sqlx::query_as::<_, EnrolledSubject>(
            r#"
            SELECT us.id AS user_subject_id, s.id AS subject_id, s.title,
                   us.percentage, us.rating, us.is_completed
            FROM user_subjects us
            JOIN subjects s ON s.id = us.subject_id
            WHERE us.user_id = $1
            ORDER BY s.title
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(subjects)
    }

    pub async fn subject_progress(
        &self,
        user_id: Uuid,
        user_subject_id: Uuid,
    ) -> Result<SubjectProgress> {
        let user_subject = sqlx::query_as::<_, UserSubject>(
            r#"SELECT * FROM user_subjects WHERE id = $1 AND user_id = $2"#,
        )
        .bind(user_subject_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Subject not found".to_string()))?;

        let subject = sqlx::query_as::<_, Subject>(r#"SELECT * FROM subjects WHERE id = $1"#)
            .bind(user_subject.subject_id)
            .fetch_one(&self.pool)
            .await?;

        let chapters = sqlx::query_as::<_, Chapter>(
            r#"SELECT * FROM chapters WHERE subject_id = $1 ORDER BY "order", id"#,
        )
        .bind(subject.id)
        .fetch_all(&self.pool)
        .await?;

        let user_chapters = sqlx::query_as::<_, UserChapter>(
            r#"SELECT * FROM user_chapters WHERE user_subject_id = $1"#,
        )
        .bind(user_subject.id)
        .fetch_all(&self.pool)
        .await?;

        let lessons = sqlx::query_as::<_, Lesson>(
            r#"SELECT * FROM lessons WHERE subject_id = $1 ORDER BY quarter, "order", id"#,
        )
        .bind(subject.id)
        .fetch_all(&self.pool)
        .await?;

        let user_lessons = sqlx::query_as::<_, UserLesson>(
            r#"SELECT * FROM user_lessons WHERE user_subject_id = $1"#,
        )
        .bind(user_subject.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(SubjectProgress {
            chapters: group_by_chapter(chapters, user_chapters, lessons, user_lessons),
            subject,
            user_subject,
        })
    }
}

pub fn pair_with_enrollment(
    subjects: Vec<Subject>,
    user_subjects: Vec<UserSubject>,
) -> Vec<CatalogEntry> {
    let mut by_subject: HashMap<Uuid, UserSubject> = user_subjects
        .into_iter()
        .map(|us| (us.subject_id, us))
        .collect();
    subjects
        .into_iter()
        .map(|subject| CatalogEntry {
            user_subject: by_subject.remove(&subject.id),
            subject,
        })
        .collect()
}

pub fn outline(chapters: Vec<Chapter>, lessons: Vec<Lesson>) -> Vec<ChapterOutline> {
    let mut by_chapter: HashMap<Uuid, Vec<Lesson>> = HashMap::new();
    for lesson in lessons {
        by_chapter.entry(lesson.chapter_id).or_default().push(lesson);
    }
    chapters
        .into_iter()
        .map(|chapter| ChapterOutline {
            lessons: by_chapter.remove(&chapter.id).unwrap_or_default(),
            chapter,
        })
        .collect()
}

/// Nests lessons under their chapters. Lessons the student has no progress row for are left out.
pub fn group_by_chapter(
    chapters: Vec<Chapter>,
    user_chapters: Vec<UserChapter>,
    lessons: Vec<Lesson>,
    user_lessons: Vec<UserLesson>,
) -> Vec<ChapterProgress> {
    let mut user_chapters: HashMap<Uuid, UserChapter> = user_chapters
        .into_iter()
        .map(|uc| (uc.chapter_id, uc))
        .collect();
    let mut user_lessons: HashMap<Uuid, UserLesson> = user_lessons
        .into_iter()
        .map(|ul| (ul.lesson_id, ul))
        .collect();

    let mut by_chapter: HashMap<Uuid, Vec<LessonProgress>> = HashMap::new();
    for lesson in lessons {
        if let Some(user_lesson) = user_lessons.remove(&lesson.id) {
            by_chapter
                .entry(lesson.chapter_id)
                .or_default()
                .push(LessonProgress {
                    lesson,
                    user_lesson,
                });
        }
    }

    chapters
        .into_iter()
        .map(|chapter| ChapterProgress {
            user_chapter: user_chapters.remove(&chapter.id),
            lessons: by_chapter.remove(&chapter.id).unwrap_or_default(),
            chapter,
        })
        .collect()
}
