use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Default)]
pub struct QuizHistoryParams {
    pub quiz_id: Option<i64>,
    pub user_id: Option<i64>,
}

#[derive(Deserialize, Serialize, Debug, Default)]
pub struct ProgHistoryParams {
    pub prog_problem_id: Option<i64>,
    pub user_id: Option<i64>,
}
