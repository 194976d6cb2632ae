//! Canonical scoring policy shared by the grading and aggregation engines.
//!
//! Ratings are exact decimals so that half of an odd maximum survives a
//! round trip through the database.

use rust_decimal::Decimal;

use crate::models::feedback::StatusMessage;

/// Half of the full rating. A task worth a single point never awards half.
pub fn half_rating(full: Decimal) -> Decimal {
    if full > Decimal::ONE {
        full / Decimal::TWO
    } else {
        Decimal::ZERO
    }
}

/// Keeps a rating inside `[0, full]`.
pub fn clamp_rating(rating: Decimal, full: Decimal) -> Decimal {
    let ceiling = full.max(Decimal::ZERO);
    rating.max(Decimal::ZERO).min(ceiling)
}

/// Keeps a percentage inside `[0, 100]`.
pub fn clamp_percentage(value: Decimal) -> Decimal {
    value.max(Decimal::ZERO).min(Decimal::ONE_HUNDRED)
}

/// `part / whole * 100`, or 0 for an empty whole.
pub fn ratio_percentage(part: Decimal, whole: Decimal) -> Decimal {
    if whole <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    clamp_percentage(part / whole * Decimal::ONE_HUNDRED).round_dp(2)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    pub rating: Decimal,
    pub message: StatusMessage,
}

impl Score {
    fn new(rating: Decimal, full: Decimal, message: StatusMessage) -> Self {
        Self {
            rating: clamp_rating(rating, full),
            message,
        }
    }
}

pub fn text_gap_score(total: usize, correct: usize, full: Decimal) -> Score {
    let incorrect = total.saturating_sub(correct);
    if incorrect == 0 {
        Score::new(full, full, StatusMessage::success("all_correct"))
    } else if incorrect == 1 {
        Score::new(half_rating(full), full, StatusMessage::warning("one_mistake"))
    } else if incorrect * 2 >= total {
        Score::new(Decimal::ZERO, full, StatusMessage::error("too_many_mistakes"))
    } else {
        Score::new(half_rating(full), full, StatusMessage::info("some_mistakes"))
    }
}

/// Wrongly answered questions of a graded test, by question type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TestTally {
    pub simple_wrong: usize,
    pub multiple_wrong: usize,
}

pub fn test_score(tally: TestTally, full: Decimal) -> Score {
    if tally.simple_wrong > 0 {
        Score::new(Decimal::ZERO, full, StatusMessage::error("wrong_single_choice"))
    } else if tally.multiple_wrong == 1 {
        Score::new(half_rating(full), full, StatusMessage::warning("one_mistake"))
    } else if tally.multiple_wrong > 1 {
        Score::new(Decimal::ZERO, full, StatusMessage::error("too_many_mistakes"))
    } else {
        Score::new(full, full, StatusMessage::success("all_correct"))
    }
}

pub fn matching_score(total: usize, wrong: usize, full: Decimal) -> Score {
    if wrong == 0 {
        Score::new(full, full, StatusMessage::success("all_correct"))
    } else if wrong == 1 {
        Score::new(half_rating(full), full, StatusMessage::warning("one_mistake"))
    } else if wrong * 2 > total {
        Score::new(Decimal::ZERO, full, StatusMessage::error("too_many_mistakes"))
    } else {
        Score::new(half_rating(full), full, StatusMessage::info("some_mistakes"))
    }
}

pub fn table_score(total: usize, correct: usize, full: Decimal) -> Score {
    if correct == total {
        Score::new(full, full, StatusMessage::success("all_correct"))
    } else if correct * 2 >= total {
        Score::new(full / Decimal::TWO, full, StatusMessage::warning("half_correct"))
    } else {
        Score::new(Decimal::ZERO, full, StatusMessage::error("too_many_mistakes"))
    }
}

/// Final subject grade on the 2–5 scale from an average quarter percentage.
pub fn subject_grade(average_percentage: Decimal) -> Decimal {
    if average_percentage < Decimal::from(40) {
        Decimal::from(2)
    } else if average_percentage < Decimal::from(65) {
        Decimal::from(3)
    } else if average_percentage < Decimal::from(85) {
        Decimal::from(4)
    } else {
        Decimal::from(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::feedback::MessageLevel;

    fn d(v: i64) -> Decimal {
        Decimal::from(v)
    }

    #[test]
    fn one_wrong_gap_out_of_four_halves_the_rating() {
        let score = text_gap_score(4, 3, d(10));
        assert_eq!(score.rating, d(5));
        assert_eq!(score.message.level, MessageLevel::Warning);
    }

    #[test]
    fn single_point_tasks_never_award_half() {
        assert_eq!(text_gap_score(4, 3, d(1)).rating, Decimal::ZERO);
        assert_eq!(matching_score(4, 1, d(1)).rating, Decimal::ZERO);
        assert_eq!(half_rating(d(1)), Decimal::ZERO);
        assert_eq!(half_rating(d(5)), Decimal::new(25, 1));
    }

    #[test]
    fn text_gap_score_never_grows_with_mistakes() {
        for total in 1..=12usize {
            let mut previous = None;
            for wrong in 0..=total {
                let rating = text_gap_score(total, total - wrong, d(10)).rating;
                assert!(rating >= Decimal::ZERO);
                if let Some(prev) = previous {
                    assert!(rating <= prev, "total={} wrong={}", total, wrong);
                }
                previous = Some(rating);
            }
        }
    }

    #[test]
    fn gaps_wrong_by_half_or_more_score_zero() {
        assert_eq!(text_gap_score(6, 3, d(10)).rating, Decimal::ZERO);
        assert_eq!(text_gap_score(6, 4, d(10)).rating, d(5));
        assert_eq!(text_gap_score(0, 0, d(10)).rating, d(10));
    }

    #[test]
    fn test_policy_cases() {
        let all = TestTally::default();
        assert_eq!(test_score(all, d(8)).rating, d(8));

        let simple = TestTally { simple_wrong: 1, multiple_wrong: 0 };
        assert_eq!(test_score(simple, d(8)).rating, Decimal::ZERO);

        let one_multi = TestTally { simple_wrong: 0, multiple_wrong: 1 };
        assert_eq!(test_score(one_multi, d(8)).rating, d(4));

        let two_multi = TestTally { simple_wrong: 0, multiple_wrong: 2 };
        assert_eq!(test_score(two_multi, d(8)).rating, Decimal::ZERO);
    }

    #[test]
    fn matching_policy_cases() {
        assert_eq!(matching_score(6, 0, d(6)).rating, d(6));
        assert_eq!(matching_score(6, 1, d(6)).rating, d(3));
        assert_eq!(matching_score(6, 3, d(6)).rating, d(3));
        assert_eq!(matching_score(6, 4, d(6)).rating, Decimal::ZERO);
    }

    #[test]
    fn table_policy_cases() {
        assert_eq!(table_score(4, 4, d(4)).rating, d(4));
        assert_eq!(table_score(4, 2, d(4)).rating, d(2));
        assert_eq!(table_score(4, 1, d(4)).rating, Decimal::ZERO);
        assert_eq!(table_score(4, 2, d(1)).rating, Decimal::new(5, 1));
        assert_eq!(table_score(4, 4, d(0)).rating, Decimal::ZERO);
    }

    #[test]
    fn percentages_are_bounded() {
        assert_eq!(ratio_percentage(d(3), d(4)), d(75));
        assert_eq!(ratio_percentage(d(5), d(0)), Decimal::ZERO);
        assert_eq!(ratio_percentage(d(12), d(10)), d(100));
        assert_eq!(clamp_percentage(d(-3)), Decimal::ZERO);
    }

    #[test]
    fn grade_thresholds() {
        assert_eq!(subject_grade(d(39)), d(2));
        assert_eq!(subject_grade(d(40)), d(3));
        assert_eq!(subject_grade(d(50)), d(3));
        assert_eq!(subject_grade(d(65)), d(4));
        assert_eq!(subject_grade(d(85)), d(5));
    }
}
