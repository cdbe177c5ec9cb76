use crate::schema::{affectations, team_members, teams};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = teams)]
pub struct NewTeam {
    pub name: String,
    pub description: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = team_members)]
pub struct NewTeamMember {
    pub team_id: i64,
    pub user_id: i64,
    // joined_at has a DB default (CURRENT_TIMESTAMP)
}

#[derive(Deserialize, Serialize, Debug)]
pub struct TeamSummaryResponse {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub member_count: i64,
}

#[derive(Queryable, Deserialize, Serialize, Debug)]
pub struct TeamMemberResponse {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct TeamDetailResponse {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub members: Vec<TeamMemberResponse>,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct LeaderboardEntry {
    pub rank: i32,
    pub user_id: i64,
    pub username: String,
    pub total_score: i64,
    pub attempts: i64,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = affectations)]
pub struct NewAffectation {
    pub user_id: i64,
    pub quiz_id: Option<i64>,
    pub prog_problem_id: Option<i64>,
    pub team_id: Option<i64>,
    pub due_at: Option<DateTime<Utc>>,
    // assigned_at has a DB default (CURRENT_TIMESTAMP)
}

#[derive(Queryable, Selectable, Deserialize, Serialize, Debug, Clone)]
#[diesel(table_name = affectations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Affectation {
    pub id: i64,
    pub user_id: i64,
    pub quiz_id: Option<i64>,
    pub prog_problem_id: Option<i64>,
    pub team_id: Option<i64>,
    pub assigned_at: DateTime<Utc>,
    pub due_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Affectation {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.completed_at.is_none() && self.due_at.is_some_and(|due| due < now)
    }
}

#[derive(Deserialize, Serialize, Debug)]
pub struct MyAffectationResponse {
    pub id: i64,
    pub quiz_id: Option<i64>,
    pub prog_problem_id: Option<i64>,
    pub title: String,
    pub team_id: Option<i64>,
    pub assigned_at: DateTime<Utc>,
    pub due_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed: bool,
    pub overdue: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn affectation(due_at: Option<DateTime<Utc>>, completed_at: Option<DateTime<Utc>>) -> Affectation {
        Affectation {
            id: 1,
            user_id: 1,
            quiz_id: Some(1),
            prog_problem_id: None,
            team_id: None,
            assigned_at: Utc::now() - Duration::days(3),
            due_at,
            completed_at,
        }
    }

    #[test]
    fn overdue_only_when_past_due_and_pending() {
        let now = Utc::now();
        assert!(affectation(Some(now - Duration::hours(1)), None).is_overdue(now));
        assert!(!affectation(Some(now + Duration::hours(1)), None).is_overdue(now));
        assert!(!affectation(Some(now - Duration::hours(1)), Some(now)).is_overdue(now));
        assert!(!affectation(None, None).is_overdue(now));
    }
}
