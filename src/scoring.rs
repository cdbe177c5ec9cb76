//! Grading rules for quiz answers and programming task submissions.
//!
//! Everything here is pure; handlers load rows, call into this module and
//! persist what it returns.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};

/// Extra time accepted after a question's limit to absorb network latency.
pub const ANSWER_GRACE_SECONDS: i64 = 2;

/// Minimum similarity to the model solution for a submission to earn points.
pub const PASS_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerGrade {
    pub correct: bool,
    pub timed_out: bool,
    pub points_awarded: i32,
}

impl AnswerGrade {
    /// Grade for a question that was never answered before the attempt ended.
    pub fn unanswered() -> Self {
        AnswerGrade {
            correct: false,
            timed_out: false,
            points_awarded: 0,
        }
    }
}

pub fn is_timed_out(elapsed: Duration, time_limit_seconds: i32) -> bool {
    elapsed > Duration::seconds(i64::from(time_limit_seconds) + ANSWER_GRACE_SECONDS)
}

/// Seconds left on a question's countdown, never negative.
pub fn remaining_seconds(
    started_at: DateTime<Utc>,
    now: DateTime<Utc>,
    time_limit_seconds: i32,
) -> i64 {
    let deadline = started_at + Duration::seconds(i64::from(time_limit_seconds));
    (deadline - now).num_seconds().max(0)
}

/// Compares the selected option with the correct one. A late answer earns
/// nothing even when the option matches.
pub fn grade_answer(
    selected: Option<&str>,
    correct_answer: &str,
    points: i32,
    elapsed: Duration,
    time_limit_seconds: i32,
) -> AnswerGrade {
    if is_timed_out(elapsed, time_limit_seconds) {
        return AnswerGrade {
            correct: false,
            timed_out: true,
            points_awarded: 0,
        };
    }

    let correct = selected == Some(correct_answer);
    AnswerGrade {
        correct,
        timed_out: false,
        points_awarded: if correct { points } else { 0 },
    }
}

/// `score / total * 100`, rounded to two decimals; zero when there is nothing to score.
pub fn percentage(score: i32, total_points: i32) -> BigDecimal {
    if total_points <= 0 {
        return BigDecimal::from(0);
    }
    (BigDecimal::from(i64::from(score) * 100) / BigDecimal::from(i64::from(total_points))).round(2)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QuizSummary {
    pub score: i32,
    pub total_points: i32,
    pub correct_count: i32,
    pub question_count: i32,
}

impl QuizSummary {
    /// Folds per-question `(points available, grade)` pairs into attempt totals.
    pub fn from_grades<I>(grades: I) -> Self
    where
        I: IntoIterator<Item = (i32, AnswerGrade)>,
    {
        grades
            .into_iter()
            .fold(QuizSummary::default(), |mut acc, (points, grade)| {
                acc.question_count += 1;
                acc.total_points += points;
                acc.score += grade.points_awarded;
                if grade.correct {
                    acc.correct_count += 1;
                }
                acc
            })
    }

    pub fn percentage(&self) -> BigDecimal {
        percentage(self.score, self.total_points)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CodeEvaluation {
    pub similarity: f64,
    pub points_awarded: i32,
    pub passed: bool,
}

/// Strips comments and layout so that formatting differences do not count.
///
/// Full-line `#` comments and everything after `//` are dropped, then all
/// whitespace runs collapse to a single space.
pub fn normalize_source(source: &str) -> String {
    source
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .map(|line| match line.find("//") {
            Some(idx) => &line[..idx],
            None => line,
        })
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn evaluate_code(submitted: &str, model_solution: &str, points: i32) -> CodeEvaluation {
    let submitted = normalize_source(submitted);
    let model = normalize_source(model_solution);

    if submitted.is_empty() {
        return CodeEvaluation {
            similarity: 0.0,
            points_awarded: 0,
            passed: false,
        };
    }

    if submitted == model {
        return CodeEvaluation {
            similarity: 1.0,
            points_awarded: points,
            passed: true,
        };
    }

    let similarity = strsim::normalized_levenshtein(&submitted, &model);
    let passed = similarity >= PASS_THRESHOLD;
    let points_awarded = if passed {
        (f64::from(points) * similarity).round() as i32
    } else {
        0
    };

    CodeEvaluation {
        similarity,
        points_awarded,
        passed,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgSummary {
    pub score: i32,
    pub total_points: i32,
    pub solved_tasks: i32,
    pub task_count: i32,
}

impl ProgSummary {
    /// Folds `(points available, best points obtained)` per task.
    pub fn from_tasks<I>(tasks: I) -> Self
    where
        I: IntoIterator<Item = (i32, Option<i32>)>,
    {
        tasks
            .into_iter()
            .fold(ProgSummary::default(), |mut acc, (points, best)| {
                acc.task_count += 1;
                acc.total_points += points;
                if let Some(best) = best.filter(|b| *b > 0) {
                    acc.score += best;
                    acc.solved_tasks += 1;
                }
                acc
            })
    }

    pub fn percentage(&self) -> BigDecimal {
        percentage(self.score, self.total_points)
    }
}
