use crate::schema::{languages, prog_problems, questions, quiz_questions, quizzes, tasks};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = languages)]
pub struct NewLanguage {
    pub name: String,
    pub description: String,
}

#[derive(Queryable, Selectable, Deserialize, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = languages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Language {
    pub id: i64,
    pub name: String,
    pub description: String,
}

#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = questions)]
pub struct NewQuestion {
    pub language_id: i64,
    pub prompt: String,
    pub options: JsonValue,
    pub correct_answer: String,
    pub points: i32,
    pub time_limit_seconds: i32,
    pub difficulty: String,
    // created_at has a DB default (CURRENT_TIMESTAMP)
}

#[derive(Queryable, Selectable, Deserialize, Serialize, Debug, Clone)]
#[diesel(table_name = questions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Question {
    pub id: i64,
    pub language_id: i64,
    pub prompt: String,
    pub options: JsonValue,
    pub correct_answer: String,
    pub points: i32,
    pub time_limit_seconds: i32,
    pub difficulty: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = quizzes)]
pub struct NewQuiz {
    pub title: String,
    pub description: String,
    pub language_id: i64,
    pub access_code: String,
    pub active: bool,
    pub created_by: Option<i64>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = quiz_questions)]
pub struct NewQuizQuestion {
    pub quiz_id: i64,
    pub question_id: i64,
    pub position: i32,
}

#[derive(Queryable, Selectable, Deserialize, Serialize, Debug, Clone)]
#[diesel(table_name = quizzes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Quiz {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub language_id: i64,
    pub access_code: String,
    pub active: bool,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct AccessCodeResponse {
    pub id: i64,
    pub access_code: String,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct QuizSummaryResponse {
    pub id: i64,
    pub title: String,
    pub language_id: i64,
    pub access_code: String,
    pub active: bool,
    pub question_count: i64,
    pub total_points: i64,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct QuizDetailResponse {
    #[serde(flatten)]
    pub quiz: Quiz,
    pub questions: Vec<Question>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = prog_problems)]
pub struct NewProgProblem {
    pub title: String,
    pub description: String,
    pub language_id: i64,
    pub access_code: String,
    pub active: bool,
    pub created_by: Option<i64>,
}

#[derive(Queryable, Selectable, Deserialize, Serialize, Debug, Clone)]
#[diesel(table_name = prog_problems)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProgProblem {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub language_id: i64,
    pub access_code: String,
    pub active: bool,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = tasks)]
pub struct NewTask {
    pub prog_problem_id: i64,
    pub position: i32,
    pub title: String,
    pub statement: String,
    pub model_solution: String,
    pub points: i32,
    pub time_limit_seconds: i32,
}

#[derive(AsChangeset, Debug)]
#[diesel(table_name = tasks)]
pub struct TaskChangeset {
    pub title: String,
    pub statement: String,
    pub model_solution: String,
    pub points: i32,
    pub time_limit_seconds: i32,
}

#[derive(Queryable, Selectable, Deserialize, Serialize, Debug, Clone)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Task {
    pub id: i64,
    pub prog_problem_id: i64,
    pub position: i32,
    pub title: String,
    pub statement: String,
    pub model_solution: String,
    pub points: i32,
    pub time_limit_seconds: i32,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct ProgProblemSummaryResponse {
    pub id: i64,
    pub title: String,
    pub language_id: i64,
    pub access_code: String,
    pub active: bool,
    pub task_count: i64,
    pub total_points: i64,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct ProgProblemDetailResponse {
    #[serde(flatten)]
    pub problem: ProgProblem,
    pub tasks: Vec<Task>,
}
