use crate::errors::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug)]
pub struct TeamPayload {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct AddMemberPayload {
    pub user_id: i64,
}

#[derive(Deserialize, Serialize, Debug, Default)]
pub struct CreateAffectationPayload {
    pub user_id: Option<i64>,
    pub team_id: Option<i64>,
    pub quiz_id: Option<i64>,
    pub prog_problem_id: Option<i64>,
    pub due_at: Option<DateTime<Utc>>,
}

/// Who receives an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignee {
    User(i64),
    Team(i64),
}

/// What is being assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignedItem {
    Quiz(i64),
    ProgProblem(i64),
}

impl CreateAffectationPayload {
    pub fn resolve(&self) -> Result<(Assignee, AssignedItem), AppError> {
        let assignee = match (self.user_id, self.team_id) {
            (Some(user_id), None) => Assignee::User(user_id),
            (None, Some(team_id)) => Assignee::Team(team_id),
            _ => {
                return Err(AppError::UnprocessableEntity(
                    "Exactly one of 'user_id' or 'team_id' must be given.".to_string(),
                ));
            }
        };
        let item = match (self.quiz_id, self.prog_problem_id) {
            (Some(quiz_id), None) => AssignedItem::Quiz(quiz_id),
            (None, Some(problem_id)) => AssignedItem::ProgProblem(problem_id),
            _ => {
                return Err(AppError::UnprocessableEntity(
                    "Exactly one of 'quiz_id' or 'prog_problem_id' must be given.".to_string(),
                ));
            }
        };
        Ok((assignee, item))
    }
}

#[derive(Deserialize, Serialize, Debug, Default)]
pub struct ListAffectationsParams {
    pub user_id: Option<i64>,
    pub quiz_id: Option<i64>,
    pub prog_problem_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_single_assignee_and_item() {
        let payload = CreateAffectationPayload {
            team_id: Some(3),
            prog_problem_id: Some(9),
            ..Default::default()
        };
        assert_eq!(
            payload.resolve().unwrap(),
            (Assignee::Team(3), AssignedItem::ProgProblem(9))
        );
    }

    #[test]
    fn rejects_ambiguous_or_missing_targets() {
        let both_assignees = CreateAffectationPayload {
            user_id: Some(1),
            team_id: Some(2),
            quiz_id: Some(1),
            ..Default::default()
        };
        assert!(both_assignees.resolve().is_err());

        let no_item = CreateAffectationPayload {
            user_id: Some(1),
            ..Default::default()
        };
        assert!(no_item.resolve().is_err());

        let both_items = CreateAffectationPayload {
            user_id: Some(1),
            quiz_id: Some(1),
            prog_problem_id: Some(1),
            ..Default::default()
        };
        assert!(both_items.resolve().is_err());
    }
}
