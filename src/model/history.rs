use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Queryable, Deserialize, Serialize, Debug)]
pub struct QuizHistoryEntry {
    pub id: i64,
    pub quiz_id: i64,
    pub quiz_title: String,
    pub user_id: Option<i64>,
    pub participant_name: String,
    pub score: i32,
    pub total_points: i32,
    pub percentage: BigDecimal,
    pub correct_count: i32,
    pub question_count: i32,
    pub completed_at: DateTime<Utc>,
}

#[derive(Queryable, Deserialize, Serialize, Debug)]
pub struct ProgHistoryEntry {
    pub id: i64,
    pub prog_problem_id: i64,
    pub prog_problem_title: String,
    pub user_id: Option<i64>,
    pub participant_name: String,
    pub score: i32,
    pub total_points: i32,
    pub percentage: BigDecimal,
    pub solved_tasks: i32,
    pub task_count: i32,
    pub completed_at: DateTime<Utc>,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct MyHistoryResponse {
    pub quizzes: Vec<QuizHistoryEntry>,
    pub prog_problems: Vec<ProgHistoryEntry>,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct QuestionStats {
    pub question_id: i64,
    pub answered: i64,
    pub correct: i64,
    pub correct_rate: f64,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct QuizStatsResponse {
    pub quiz_id: i64,
    pub attempts: i64,
    pub completed: i64,
    pub average_percentage: Option<BigDecimal>,
    pub best_percentage: Option<BigDecimal>,
    pub questions: Vec<QuestionStats>,
}

#[derive(Deserialize, Serialize, Debug, Default)]
pub struct DashboardResponse {
    pub users: i64,
    pub languages: i64,
    pub questions: i64,
    pub quizzes: i64,
    pub prog_problems: i64,
    pub teams: i64,
    pub completed_quiz_attempts: i64,
    pub completed_prog_attempts: i64,
}
