use crate::schema::{
    attempt_answers, prog_attempts, prog_history, quiz_attempts, quiz_history, task_submissions,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

pub const STATUS_IN_PROGRESS: &str = "in_progress";
pub const STATUS_COMPLETED: &str = "completed";

#[derive(Insertable, Debug)]
#[diesel(table_name = quiz_attempts)]
pub struct NewQuizAttempt {
    pub token: Uuid,
    pub quiz_id: i64,
    pub user_id: Option<i64>,
    pub guest_name: Option<String>,
    pub affectation_id: Option<i64>,
    // current_index, score and status default to 0 / 0 / 'in_progress'
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = quiz_attempts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct QuizAttempt {
    pub id: i64,
    pub token: Uuid,
    pub quiz_id: i64,
    pub user_id: Option<i64>,
    pub guest_name: Option<String>,
    pub affectation_id: Option<i64>,
    pub current_index: i32,
    pub question_started_at: Option<DateTime<Utc>>,
    pub score: i32,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl QuizAttempt {
    pub fn is_completed(&self) -> bool {
        self.status == STATUS_COMPLETED
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = attempt_answers)]
pub struct NewAttemptAnswer {
    pub attempt_id: i64,
    pub question_id: i64,
    pub selected: Option<String>,
    pub correct: bool,
    pub timed_out: bool,
    pub points_awarded: i32,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = attempt_answers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AttemptAnswer {
    pub question_id: i64,
    pub selected: Option<String>,
    pub correct: bool,
    pub timed_out: bool,
    pub points_awarded: i32,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = quiz_history)]
pub struct NewQuizHistory {
    pub quiz_id: i64,
    pub attempt_id: i64,
    pub user_id: Option<i64>,
    pub participant_name: String,
    pub score: i32,
    pub total_points: i32,
    pub percentage: BigDecimal,
    pub correct_count: i32,
    pub question_count: i32,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct QuizJoinResponse {
    pub attempt_token: Uuid,
    pub quiz_id: i64,
    pub title: String,
    pub description: String,
    pub question_count: i32,
    pub total_points: i32,
    pub total_time_seconds: i32,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct CurrentQuestionResponse {
    pub index: i32,
    pub question_count: i32,
    pub question_id: i64,
    pub prompt: String,
    pub options: JsonValue,
    pub points: i32,
    pub time_limit_seconds: i32,
    pub remaining_seconds: i64,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct AnswerReview {
    pub question_id: i64,
    pub prompt: String,
    pub selected: Option<String>,
    pub correct_answer: String,
    pub correct: bool,
    pub timed_out: bool,
    pub points_awarded: i32,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct QuizResultResponse {
    pub score: i32,
    pub total_points: i32,
    pub percentage: BigDecimal,
    pub correct_count: i32,
    pub question_count: i32,
    pub answers: Vec<AnswerReview>,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct AnswerOutcomeResponse {
    pub correct: bool,
    pub timed_out: bool,
    pub points_awarded: i32,
    pub correct_answer: String,
    pub finished: bool,
    pub result: Option<QuizResultResponse>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = prog_attempts)]
pub struct NewProgAttempt {
    pub token: Uuid,
    pub prog_problem_id: i64,
    pub user_id: Option<i64>,
    pub guest_name: Option<String>,
    pub affectation_id: Option<i64>,
    pub deadline: DateTime<Utc>,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = prog_attempts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProgAttempt {
    pub id: i64,
    pub token: Uuid,
    pub prog_problem_id: i64,
    pub user_id: Option<i64>,
    pub guest_name: Option<String>,
    pub affectation_id: Option<i64>,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ProgAttempt {
    pub fn is_completed(&self) -> bool {
        self.status == STATUS_COMPLETED
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = task_submissions)]
pub struct NewTaskSubmission {
    pub prog_attempt_id: i64,
    pub task_id: i64,
    pub code: String,
    pub similarity: f64,
    pub points_awarded: i32,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = prog_history)]
pub struct NewProgHistory {
    pub prog_problem_id: i64,
    pub prog_attempt_id: i64,
    pub user_id: Option<i64>,
    pub participant_name: String,
    pub score: i32,
    pub total_points: i32,
    pub percentage: BigDecimal,
    pub solved_tasks: i32,
    pub task_count: i32,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct ProgJoinResponse {
    pub attempt_token: Uuid,
    pub prog_problem_id: i64,
    pub title: String,
    pub description: String,
    pub task_count: i32,
    pub total_points: i32,
    pub total_time_seconds: i32,
    pub deadline: DateTime<Utc>,
}

/// A task as shown to a participant: no model solution.
#[derive(Deserialize, Serialize, Debug)]
pub struct ProgTaskView {
    pub task_id: i64,
    pub position: i32,
    pub title: String,
    pub statement: String,
    pub points: i32,
    pub time_limit_seconds: i32,
    pub best_points: Option<i32>,
    pub submissions: i64,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct SubmissionOutcomeResponse {
    pub task_id: i64,
    pub similarity: f64,
    pub points_awarded: i32,
    pub passed: bool,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct TaskReview {
    pub task_id: i64,
    pub title: String,
    pub points: i32,
    pub best_points: Option<i32>,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct ProgResultResponse {
    pub score: i32,
    pub total_points: i32,
    pub percentage: BigDecimal,
    pub solved_tasks: i32,
    pub task_count: i32,
    pub tasks: Vec<TaskReview>,
}

/// What starting an assignment hands back, depending on the assigned item.
#[derive(Deserialize, Serialize, Debug)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JoinResponse {
    Quiz(QuizJoinResponse),
    ProgProblem(ProgJoinResponse),
}
