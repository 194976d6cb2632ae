use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::content::{
    AnswerOption, MatchingPair, Question, QuestionType, TableCell, TaskType, TextGap,
};
use crate::models::feedback::StatusMessage;
use crate::models::user_task::{
    UserAnswer, UserMatching, UserTableAnswer, UserTextGap, UserVideo, UserWritten,
};
use crate::services::scoring::{self, TestTally};
use crate::utils::form::{self, FormData};

/// Result of grading one submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Grade {
    /// New task rating; `None` leaves the stored rating untouched.
    pub rating: Option<Decimal>,
    pub completed: bool,
    pub message: StatusMessage,
}

/// Answer rows of one user task together with the content they are checked against.
#[derive(Debug, Clone)]
pub enum TaskAnswers {
    Video(Vec<UserVideo>),
    Written(Vec<UserWritten>),
    TextGap {
        answers: Vec<UserTextGap>,
        gaps: HashMap<Uuid, TextGap>,
    },
    Test {
        answers: Vec<UserAnswer>,
        questions: HashMap<Uuid, Question>,
        options: Vec<AnswerOption>,
    },
    Matching {
        answers: Vec<UserMatching>,
        pairs: HashMap<Uuid, MatchingPair>,
    },
    Table {
        answers: Vec<UserTableAnswer>,
        cells: Vec<TableCell>,
    },
}

impl TaskAnswers {
    pub fn task_type(&self) -> TaskType {
        match self {
            TaskAnswers::Video(_) => TaskType::Video,
            TaskAnswers::Written(_) => TaskType::Written,
            TaskAnswers::TextGap { .. } => TaskType::TextGap,
            TaskAnswers::Test { .. } => TaskType::Test,
            TaskAnswers::Matching { .. } => TaskType::Matching,
            TaskAnswers::Table { .. } => TaskType::Table,
        }
    }

    /// Applies the submitted form to the answer rows and scores the task.
    pub fn grade(&mut self, form: &FormData, full: Decimal) -> Grade {
        match self {
            TaskAnswers::Video(videos) => GradingService::grade_video(videos, form, full),
            TaskAnswers::Written(rows) => GradingService::grade_written(rows, form),
            TaskAnswers::TextGap { answers, gaps } => {
                GradingService::grade_text_gap(answers, gaps, form, full)
            }
            TaskAnswers::Test {
                answers,
                questions,
                options,
            } => GradingService::grade_test(answers, questions, options, form, full),
            TaskAnswers::Matching { answers, pairs } => {
                GradingService::grade_matching(answers, pairs, form, full)
            }
            TaskAnswers::Table { answers, cells } => {
                GradingService::grade_table(answers, cells, form, full)
            }
        }
    }
}

pub struct GradingService;

impl GradingService {
    pub fn grade_video(videos: &mut [UserVideo], form: &FormData, full: Decimal) -> Grade {
        for video in videos.iter_mut() {
            video.watched_seconds = form.int_or_zero(&form::watched_key(video.id));
            video.is_completed = true;
        }

        // Reaching the submit marks every sub-video watched.
        Grade {
            rating: Some(scoring::clamp_rating(full, full)),
            completed: true,
            message: StatusMessage::success("video_completed"),
        }
    }

    /// Written answers are stored for manual review and never auto-scored.
    pub fn grade_written(rows: &mut [UserWritten], form: &FormData) -> Grade {
        for row in rows.iter_mut() {
            let answer = form.get(&form::answer_key(row.id)).unwrap_or("").trim();
            if !answer.is_empty() {
                row.answer = answer.to_string();
                row.is_submitted = true;
            }
        }

        let all_submitted = rows.iter().all(|r| r.is_submitted);
        Grade {
            rating: None,
            completed: all_submitted,
            message: if all_submitted {
                StatusMessage::success("answers_submitted")
            } else {
                StatusMessage::warning("answers_incomplete")
            },
        }
    }

    pub fn grade_text_gap(
        answers: &mut [UserTextGap],
        gaps: &HashMap<Uuid, TextGap>,
        form: &FormData,
        full: Decimal,
    ) -> Grade {
        let total = answers.len();
        let mut correct = 0;

        for row in answers.iter_mut() {
            let submitted = form.get(&form::answer_key(row.id)).unwrap_or("").trim();
            row.is_correct = gaps
                .get(&row.text_gap_id)
                .map(|gap| submitted.to_lowercase() == gap.correct_answer.trim().to_lowercase())
                .unwrap_or(false);
            row.answer = Some(submitted.to_string());
            if row.is_correct {
                correct += 1;
            }
        }

        let score = scoring::text_gap_score(total, correct, full);
        Grade {
            rating: Some(score.rating),
            completed: true,
            message: score.message,
        }
    }

    pub fn grade_test(
        answers: &mut [UserAnswer],
        questions: &HashMap<Uuid, Question>,
        options: &[AnswerOption],
        form: &FormData,
        full: Decimal,
    ) -> Grade {
        let mut tally = TestTally::default();
        let mut any_answered = false;

        for answer in answers.iter_mut() {
            let question_options: Vec<&AnswerOption> = options
                .iter()
                .filter(|o| o.question_id == answer.question_id)
                .collect();
            let valid: HashSet<Uuid> = question_options.iter().map(|o| o.id).collect();
            let correct: HashSet<Uuid> = question_options
                .iter()
                .filter(|o| o.is_correct)
                .map(|o| o.id)
                .collect();

            let mut selected: Vec<Uuid> = Vec::new();
            for id in form.ids(&form::question_key(answer.question_id)) {
                if valid.contains(&id) && !selected.contains(&id) {
                    selected.push(id);
                }
            }
            if !selected.is_empty() {
                any_answered = true;
            }

            let is_exact = selected.iter().copied().collect::<HashSet<Uuid>>() == correct;
            let kind = questions
                .get(&answer.question_id)
                .map(Question::kind)
                .unwrap_or(QuestionType::Simple);
            match (kind, is_exact) {
                (_, true) => {}
                (QuestionType::Simple, false) => tally.simple_wrong += 1,
                (QuestionType::Multiple, false) => tally.multiple_wrong += 1,
            }

            answer.option_ids = selected;
        }

        if !any_answered {
            return Grade {
                rating: Some(Decimal::ZERO),
                completed: false,
                message: StatusMessage::warning("nothing_selected"),
            };
        }

        let score = scoring::test_score(tally, full);
        Grade {
            rating: Some(score.rating),
            completed: true,
            message: score.message,
        }
    }

    pub fn grade_matching(
        answers: &mut [UserMatching],
        pairs: &HashMap<Uuid, MatchingPair>,
        form: &FormData,
        full: Decimal,
    ) -> Grade {
        for answer in answers.iter_mut() {
            let Some(selected) = form.get(&form::selected_right_key(answer.id)) else {
                continue;
            };
            match pairs.get(&answer.pair_id) {
                Some(pair) => {
                    answer.check_answer(pair, selected);
                }
                None => {
                    answer.selected_right = selected.trim().to_string();
                    answer.is_correct = false;
                }
            }
        }

        let total = answers.len();
        let wrong = answers.iter().filter(|a| !a.is_correct).count();
        let score = scoring::matching_score(total, wrong, full);
        Grade {
            rating: Some(score.rating),
            completed: true,
            message: score.message,
        }
    }

    pub fn grade_table(
        answers: &mut [UserTableAnswer],
        cells: &[TableCell],
        form: &FormData,
        full: Decimal,
    ) -> Grade {
        let correct_map: HashMap<(Uuid, Uuid), bool> = cells
            .iter()
            .map(|c| ((c.row_id, c.column_id), c.correct))
            .collect();

        let mut correct = 0;
        for answer in answers.iter_mut() {
            let checked = form.is_checked(&form::cell_key(answer.row_id, answer.column_id));
            answer.checked = checked;
            answer.is_submitted = true;
            if correct_map.get(&(answer.row_id, answer.column_id)) == Some(&checked) {
                correct += 1;
            }
        }

        let score = scoring::table_score(answers.len(), correct, full);
        Grade {
            rating: Some(score.rating),
            completed: true,
            message: score.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::feedback::MessageLevel;

    fn d(v: i64) -> Decimal {
        Decimal::from(v)
    }

    fn text_gap_fixture(answers: &[(&str, &str)]) -> (Vec<UserTextGap>, HashMap<Uuid, TextGap>, FormData) {
        let task_id = Uuid::new_v4();
        let user_task_id = Uuid::new_v4();
        let mut rows = Vec::new();
        let mut gaps = HashMap::new();
        let mut form = FormData::new();
        for (correct, submitted) in answers {
            let gap = TextGap {
                id: Uuid::new_v4(),
                task_id,
                prompt: "... ".into(),
                correct_answer: correct.to_string(),
            };
            let row = UserTextGap {
                id: Uuid::new_v4(),
                user_task_id,
                text_gap_id: gap.id,
                answer: None,
                is_correct: false,
            };
            form.insert(form::answer_key(row.id), submitted.to_string());
            gaps.insert(gap.id, gap);
            rows.push(row);
        }
        (rows, gaps, form)
    }

    #[test]
    fn text_gap_matches_case_insensitively_and_trimmed() {
        let (mut rows, gaps, form) = text_gap_fixture(&[
            ("Astana", "  astana "),
            ("river", "RIVER"),
            ("steppe", "steppe"),
            ("mountain", "hill"),
        ]);
        let grade = GradingService::grade_text_gap(&mut rows, &gaps, &form, d(10));
        assert_eq!(grade.rating, Some(d(5)));
        assert!(grade.completed);
        assert_eq!(rows.iter().filter(|r| r.is_correct).count(), 3);
        assert_eq!(rows[0].answer.as_deref(), Some("astana"));
    }

    struct TestFixture {
        answers: Vec<UserAnswer>,
        questions: HashMap<Uuid, Question>,
        options: Vec<AnswerOption>,
    }

    fn test_fixture(kinds: &[&str]) -> TestFixture {
        let task_id = Uuid::new_v4();
        let user_task_id = Uuid::new_v4();
        let mut fixture = TestFixture {
            answers: Vec::new(),
            questions: HashMap::new(),
            options: Vec::new(),
        };
        for (i, kind) in kinds.iter().enumerate() {
            let question = Question {
                id: Uuid::new_v4(),
                task_id,
                text: format!("Q{}", i),
                question_type: kind.to_string(),
                order: i as i32,
            };
            let correct_count = if *kind == "multiple" { 2 } else { 1 };
            for n in 0..3 {
                fixture.options.push(AnswerOption {
                    id: Uuid::new_v4(),
                    question_id: question.id,
                    text: Some(format!("option {}", n)),
                    is_correct: n < correct_count,
                });
            }
            fixture.answers.push(UserAnswer {
                id: Uuid::new_v4(),
                user_task_id,
                question_id: question.id,
                option_ids: Vec::new(),
            });
            fixture.questions.insert(question.id, question);
        }
        fixture
    }

    fn select(form: &mut FormData, fixture: &TestFixture, question_id: Uuid, correct: bool) {
        for option in fixture
            .options
            .iter()
            .filter(|o| o.question_id == question_id && o.is_correct == correct)
        {
            form.insert(form::question_key(question_id), option.id.to_string());
        }
    }

    #[test]
    fn exact_option_sets_earn_full_rating() {
        let mut fixture = test_fixture(&["simple", "multiple", "multiple"]);
        let mut form = FormData::new();
        let ids: Vec<Uuid> = fixture.answers.iter().map(|a| a.question_id).collect();
        for id in ids {
            select(&mut form, &fixture, id, true);
        }
        let grade = GradingService::grade_test(
            &mut fixture.answers,
            &fixture.questions,
            &fixture.options,
            &form,
            d(6),
        );
        assert_eq!(grade.rating, Some(d(6)));
        assert!(grade.completed);
        assert_eq!(fixture.answers[1].option_ids.len(), 2);
    }

    #[test]
    fn nothing_selected_scores_zero_without_completion() {
        let mut fixture = test_fixture(&["simple", "multiple"]);
        let form = FormData::new();
        let grade = GradingService::grade_test(
            &mut fixture.answers,
            &fixture.questions,
            &fixture.options,
            &form,
            d(6),
        );
        assert_eq!(grade.rating, Some(Decimal::ZERO));
        assert!(!grade.completed);
        assert_eq!(grade.message.level, MessageLevel::Warning);
    }

    #[test]
    fn forged_option_ids_are_ignored() {
        let mut fixture = test_fixture(&["simple", "simple"]);
        let mut form = FormData::new();
        let first = fixture.answers[0].question_id;
        let second = fixture.answers[1].question_id;
        select(&mut form, &fixture, first, true);
        select(&mut form, &fixture, second, true);
        // an option belonging to another question and a random id
        let foreign = fixture
            .options
            .iter()
            .find(|o| o.question_id == second)
            .map(|o| o.id)
            .unwrap();
        form.insert(form::question_key(first), foreign.to_string());
        form.insert(form::question_key(first), Uuid::new_v4().to_string());

        let grade = GradingService::grade_test(
            &mut fixture.answers,
            &fixture.questions,
            &fixture.options,
            &form,
            d(4),
        );
        assert_eq!(grade.rating, Some(d(4)));
        assert_eq!(fixture.answers[0].option_ids.len(), 1);
    }

    #[test]
    fn wrong_simple_question_zeroes_the_test() {
        let mut fixture = test_fixture(&["simple", "multiple"]);
        let mut form = FormData::new();
        let first = fixture.answers[0].question_id;
        let second = fixture.answers[1].question_id;
        select(&mut form, &fixture, first, false);
        select(&mut form, &fixture, second, true);
        let grade = GradingService::grade_test(
            &mut fixture.answers,
            &fixture.questions,
            &fixture.options,
            &form,
            d(4),
        );
        assert_eq!(grade.rating, Some(Decimal::ZERO));
        assert!(grade.completed);
    }

    #[test]
    fn one_wrong_multiple_question_halves_the_test() {
        let mut fixture = test_fixture(&["simple", "multiple", "multiple"]);
        let mut form = FormData::new();
        let ids: Vec<Uuid> = fixture.answers.iter().map(|a| a.question_id).collect();
        select(&mut form, &fixture, ids[0], true);
        select(&mut form, &fixture, ids[1], true);
        select(&mut form, &fixture, ids[2], false);
        let grade = GradingService::grade_test(
            &mut fixture.answers,
            &fixture.questions,
            &fixture.options,
            &form,
            d(4),
        );
        assert_eq!(grade.rating, Some(d(2)));
    }

    fn matching_fixture(n: usize) -> (Vec<UserMatching>, HashMap<Uuid, MatchingPair>) {
        let task_id = Uuid::new_v4();
        let user_task_id = Uuid::new_v4();
        let mut rows = Vec::new();
        let mut pairs = HashMap::new();
        for i in 0..n {
            let pair = MatchingPair {
                id: Uuid::new_v4(),
                task_id,
                left_item: format!("left {}", i),
                right_item: format!("right {}", i),
            };
            rows.push(UserMatching {
                id: Uuid::new_v4(),
                user_task_id,
                pair_id: pair.id,
                selected_right: String::new(),
                is_correct: false,
            });
            pairs.insert(pair.id, pair);
        }
        (rows, pairs)
    }

    #[test]
    fn matching_zero_wrong_earns_full_rating() {
        let (mut rows, pairs) = matching_fixture(4);
        let mut form = FormData::new();
        for row in &rows {
            let right = &pairs[&row.pair_id].right_item;
            form.insert(form::selected_right_key(row.id), right.clone());
        }
        let grade = GradingService::grade_matching(&mut rows, &pairs, &form, d(8));
        assert_eq!(grade.rating, Some(d(8)));
    }

    #[test]
    fn matching_more_than_half_wrong_scores_zero() {
        let (mut rows, pairs) = matching_fixture(5);
        let mut form = FormData::new();
        for (i, row) in rows.iter().enumerate() {
            let value = if i < 2 {
                pairs[&row.pair_id].right_item.clone()
            } else {
                "nope".to_string()
            };
            form.insert(form::selected_right_key(row.id), value);
        }
        let grade = GradingService::grade_matching(&mut rows, &pairs, &form, d(8));
        assert_eq!(grade.rating, Some(Decimal::ZERO));
        assert_eq!(rows[4].selected_right, "nope");
    }

    #[test]
    fn matching_keeps_rows_without_a_submitted_value() {
        let (mut rows, pairs) = matching_fixture(2);
        rows[1].selected_right = pairs[&rows[1].pair_id].right_item.clone();
        rows[1].is_correct = true;
        let form = FormData::new().with(
            form::selected_right_key(rows[0].id),
            pairs[&rows[0].pair_id].right_item.clone(),
        );
        let grade = GradingService::grade_matching(&mut rows, &pairs, &form, d(2));
        assert_eq!(grade.rating, Some(d(2)));
        assert!(rows[1].is_correct);
    }

    #[test]
    fn table_compares_checked_cells_with_correct_map() {
        let user_task_id = Uuid::new_v4();
        let rows = [Uuid::new_v4(), Uuid::new_v4()];
        let cols = [Uuid::new_v4(), Uuid::new_v4()];
        let mut cells = Vec::new();
        let mut answers = Vec::new();
        for (ri, r) in rows.iter().enumerate() {
            for (ci, c) in cols.iter().enumerate() {
                cells.push(TableCell {
                    id: Uuid::new_v4(),
                    row_id: *r,
                    column_id: *c,
                    correct: ri == ci,
                });
                answers.push(UserTableAnswer {
                    id: Uuid::new_v4(),
                    user_task_id,
                    row_id: *r,
                    column_id: *c,
                    checked: false,
                    is_submitted: false,
                });
            }
        }
        // diagonal checked, plus one extra wrong cell
        let form = FormData::new()
            .with(form::cell_key(rows[0], cols[0]), "on")
            .with(form::cell_key(rows[1], cols[1]), "on")
            .with(form::cell_key(rows[0], cols[1]), "on");
        let grade = GradingService::grade_table(&mut answers, &cells, &form, d(4));
        assert_eq!(grade.rating, Some(d(2)));
        assert!(answers.iter().all(|a| a.is_submitted));
    }

    #[test]
    fn video_completes_with_full_rating_and_parses_seconds() {
        let user_task_id = Uuid::new_v4();
        let mut videos = vec![
            UserVideo {
                id: Uuid::new_v4(),
                user_task_id,
                video_id: Uuid::new_v4(),
                watched_seconds: 0,
                is_completed: false,
            },
            UserVideo {
                id: Uuid::new_v4(),
                user_task_id,
                video_id: Uuid::new_v4(),
                watched_seconds: 0,
                is_completed: false,
            },
        ];
        let form = FormData::new()
            .with(form::watched_key(videos[0].id), "125")
            .with(form::watched_key(videos[1].id), "garbage");
        let grade = GradingService::grade_video(&mut videos, &form, d(3));
        assert_eq!(grade.rating, Some(d(3)));
        assert!(grade.completed);
        assert_eq!(videos[0].watched_seconds, 125);
        assert_eq!(videos[1].watched_seconds, 0);
    }

    #[test]
    fn written_is_never_scored() {
        let user_task_id = Uuid::new_v4();
        let mut rows = vec![
            UserWritten {
                id: Uuid::new_v4(),
                user_task_id,
                written_id: Uuid::new_v4(),
                answer: String::new(),
                is_submitted: false,
            },
            UserWritten {
                id: Uuid::new_v4(),
                user_task_id,
                written_id: Uuid::new_v4(),
                answer: String::new(),
                is_submitted: false,
            },
        ];
        let form = FormData::new().with(form::answer_key(rows[0].id), "  essay text ");
        let grade = GradingService::grade_written(&mut rows, &form);
        assert_eq!(grade.rating, None);
        assert!(!grade.completed);
        assert_eq!(rows[0].answer, "essay text");
        assert!(!rows[1].is_submitted);

        let form = FormData::new().with(form::answer_key(rows[1].id), "second");
        let grade = GradingService::grade_written(&mut rows, &form);
        assert!(grade.completed);
        assert_eq!(rows[0].answer, "essay text");
    }

    #[test]
    fn dispatch_reports_task_type() {
        let mut answers = TaskAnswers::Table {
            answers: Vec::new(),
            cells: Vec::new(),
        };
        assert_eq!(answers.task_type(), TaskType::Table);
        let grade = answers.grade(&FormData::new(), d(2));
        assert_eq!(grade.rating, Some(d(2)));
    }
}
