use super::TITLE_MAX_LENGTH;
use crate::errors::AppError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const DIFFICULTIES: [&str; 3] = ["easy", "medium", "hard"];

#[derive(Deserialize, Serialize, Debug)]
pub struct LanguagePayload {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct QuestionPayload {
    pub language_id: i64,
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub points: i32,
    pub time_limit_seconds: i32,
    pub difficulty: String,
}

impl QuestionPayload {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.prompt.trim().is_empty() {
            return Err(AppError::UnprocessableEntity(
                "Question prompt must not be empty.".to_string(),
            ));
        }
        if self.options.iter().any(|o| o.trim().is_empty()) {
            return Err(AppError::UnprocessableEntity(
                "Options must not be empty.".to_string(),
            ));
        }
        let distinct: HashSet<&str> = self.options.iter().map(String::as_str).collect();
        if distinct.len() < 2 || distinct.len() != self.options.len() {
            return Err(AppError::UnprocessableEntity(
                "A question needs at least two distinct options.".to_string(),
            ));
        }
        if !distinct.contains(self.correct_answer.as_str()) {
            return Err(AppError::UnprocessableEntity(
                "The correct answer must be one of the options.".to_string(),
            ));
        }
        validate_points_and_time(self.points, self.time_limit_seconds)?;
        validate_difficulty(&self.difficulty)
    }
}

#[derive(Deserialize, Serialize, Debug, Default)]
pub struct ListQuestionsParams {
    pub language_id: Option<i64>,
    pub difficulty: Option<String>,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct CreateQuizPayload {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub language_id: i64,
    pub question_ids: Vec<i64>,
}

impl CreateQuizPayload {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.question_ids.is_empty() {
            return Err(AppError::UnprocessableEntity(
                "A quiz needs at least one question.".to_string(),
            ));
        }
        let distinct: HashSet<i64> = self.question_ids.iter().copied().collect();
        if distinct.len() != self.question_ids.len() {
            return Err(AppError::UnprocessableEntity(
                "A question may appear only once in a quiz.".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Deserialize, Serialize, Debug)]
pub struct GenerateQuizPayload {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub language_id: i64,
    pub question_count: i64,
    pub difficulty: Option<String>,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct SetActivePayload {
    pub active: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TaskPayload {
    pub title: String,
    pub statement: String,
    pub model_solution: String,
    pub points: i32,
    pub time_limit_seconds: i32,
}

impl TaskPayload {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.title.trim().is_empty() || self.statement.trim().is_empty() {
            return Err(AppError::UnprocessableEntity(
                "Task title and statement must not be empty.".to_string(),
            ));
        }
        if self.title.trim().chars().count() > TITLE_MAX_LENGTH {
            return Err(AppError::UnprocessableEntity(format!(
                "Task title must be at most {} characters long.",
                TITLE_MAX_LENGTH
            )));
        }
        if self.model_solution.trim().is_empty() {
            return Err(AppError::UnprocessableEntity(
                "Task model solution must not be empty.".to_string(),
            ));
        }
        validate_points_and_time(self.points, self.time_limit_seconds)
    }
}

#[derive(Deserialize, Serialize, Debug)]
pub struct CreateProgProblemPayload {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub language_id: i64,
    pub tasks: Vec<TaskPayload>,
}

impl CreateProgProblemPayload {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.tasks.is_empty() {
            return Err(AppError::UnprocessableEntity(
                "A programming problem needs at least one task.".to_string(),
            ));
        }
        self.tasks.iter().try_for_each(TaskPayload::validate)
    }
}

pub fn validate_difficulty(difficulty: &str) -> Result<(), AppError> {
    if DIFFICULTIES.contains(&difficulty) {
        Ok(())
    } else {
        Err(AppError::UnprocessableEntity(format!(
            "Unknown difficulty '{}'. Expected one of {:?}.",
            difficulty, DIFFICULTIES
        )))
    }
}

fn validate_points_and_time(points: i32, time_limit_seconds: i32) -> Result<(), AppError> {
    if points <= 0 {
        return Err(AppError::UnprocessableEntity(
            "Points must be positive.".to_string(),
        ));
    }
    if time_limit_seconds <= 0 {
        return Err(AppError::UnprocessableEntity(
            "Time limit must be positive.".to_string(),
        ));
    }
    Ok(())
}
