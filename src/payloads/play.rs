use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug)]
pub struct VerifyCodePayload {
    pub code: String,
    pub guest_name: Option<String>,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct AnswerPayload {
    pub question_id: i64,
    /// `None` skips the question.
    pub selected: Option<String>,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct SubmitTaskPayload {
    pub task_id: i64,
    pub code: String,
}
