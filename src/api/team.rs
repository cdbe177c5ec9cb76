use super::helper;
use crate::auth::{AdminUser, AuthUser};
use crate::model::team::{
    Affectation, LeaderboardEntry, MyAffectationResponse, NewAffectation, NewTeam, NewTeamMember,
    TeamDetailResponse, TeamMemberResponse, TeamSummaryResponse,
};
use crate::payloads::team::{
    AddMemberPayload, AssignedItem, Assignee, CreateAffectationPayload, ListAffectationsParams,
    TeamPayload,
};
use crate::{
    errors::AppError,
    response::ApiResponse,
    schema::{
        affectations::dsl as aff_dsl, prog_history::dsl as ph_dsl,
        prog_problems::dsl as problems_dsl, quiz_history::dsl as qh_dsl,
        quizzes::dsl as quizzes_dsl, team_members::dsl as tm_dsl, teams::dsl as teams_dsl,
        users::dsl as users_dsl,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use deadpool_diesel::postgres::Pool;
use diesel::dsl::{count_star, exists, select, sum};
use diesel::prelude::*;
use std::collections::HashMap;
use tracing::{debug, error, info, instrument, warn};

fn team_not_found(team_id: i64) -> AppError {
    AppError::NotFound(format!("Team with ID {} not found.", team_id))
}

fn team_exists(conn: &mut PgConnection, team_id: i64) -> QueryResult<bool> {
    select(exists(teams_dsl::teams.find(team_id))).get_result(conn)
}

fn is_member(conn: &mut PgConnection, team_id: i64, user_id: i64) -> QueryResult<bool> {
    select(exists(
        tm_dsl::team_members
            .filter(tm_dsl::team_id.eq(team_id))
            .filter(tm_dsl::user_id.eq(user_id)),
    ))
    .get_result(conn)
}

/// 404 for unknown teams, 403 unless the caller is an admin or a member.
fn ensure_team_visible(
    conn: &mut PgConnection,
    team_id: i64,
    user: &AuthUser,
) -> Result<(), AppError> {
    if !team_exists(conn, team_id)? {
        return Err(team_not_found(team_id));
    }
    if !user.is_admin() && !is_member(conn, team_id, user.user_id)? {
        warn!(
            "User {} is not a member of team {}",
            user.user_id, team_id
        );
        return Err(AppError::Forbidden(format!(
            "You are not a member of team {}.",
            team_id
        )));
    }
    Ok(())
}

fn member_counts(conn: &mut PgConnection) -> QueryResult<HashMap<i64, i64>> {
    let counts: Vec<(i64, i64)> = tm_dsl::team_members
        .group_by(tm_dsl::team_id)
        .select((tm_dsl::team_id, count_star()))
        .load(conn)?;
    Ok(counts.into_iter().collect())
}

fn summarize(
    teams: Vec<(i64, String, String)>,
    counts: &HashMap<i64, i64>,
) -> Vec<TeamSummaryResponse> {
    teams
        .into_iter()
        .map(|(id, name, description)| TeamSummaryResponse {
            id,
            name,
            description,
            member_count: counts.get(&id).copied().unwrap_or(0),
        })
        .collect()
}

/// Creates a team.
///
/// Request Body: `TeamPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `i64`: The new team ID (200 OK).
/// * `409 Conflict`: If the name is taken.
/// * `422 Unprocessable Entity`: If the name is empty.
#[instrument(skip(pool))]
pub async fn create_team(
    State(pool): State<Pool>,
    AdminUser(admin): AdminUser,
    Json(payload): Json<TeamPayload>,
) -> Result<ApiResponse<i64>, AppError> {
    info!("Admin {} creating team {}", admin.user_id, payload.name);

    let new_team = NewTeam {
        name: helper::required_text(&payload.name, "name", helper::NAME_MAX_LENGTH)?,
        description: payload.description.trim().to_string(),
    };
    let name = new_team.name.clone();

    let result = helper::run_query(&pool, move |conn| {
        diesel::insert_into(teams_dsl::teams)
            .values(&new_team)
            .returning(teams_dsl::id)
            .get_result::<i64>(conn)
    })
    .await;

    match result {
        Ok(id) => {
            info!("Created team {} with ID {}", name, id);
            Ok(ApiResponse::ok(id))
        }
        Err(e) if e.is_unique_violation() => Err(AppError::Conflict(format!(
            "Team '{}' already exists.",
            name
        ))),
        Err(e) => Err(e),
    }
}

/// Lists all teams with their member counts.
#[instrument(skip(pool))]
pub async fn list_teams(
    State(pool): State<Pool>,
    AdminUser(_admin): AdminUser,
) -> Result<ApiResponse<Vec<TeamSummaryResponse>>, AppError> {
    let (teams, counts) = helper::run_query(&pool, |conn| {
        let teams: Vec<(i64, String, String)> = teams_dsl::teams
            .order(teams_dsl::name.asc())
            .select((teams_dsl::id, teams_dsl::name, teams_dsl::description))
            .load(conn)?;
        Ok((teams, member_counts(conn)?))
    })
    .await?;

    Ok(ApiResponse::ok(summarize(teams, &counts)))
}

/// Returns a team and its members. Visible to admins and to the team's members.
///
/// Returns (wrapped in `ApiResponse`)
/// * `TeamDetailResponse`: Team with members ordered by username (200 OK).
/// * `403 Forbidden`: If the caller is neither admin nor member.
/// * `404 Not Found`: If the team does not exist.
#[instrument(skip(pool))]
pub async fn get_team(
    State(pool): State<Pool>,
    user: AuthUser,
    Path(team_id): Path<i64>,
) -> Result<ApiResponse<TeamDetailResponse>, AppError> {
    let detail = helper::run_transaction(&pool, move |conn| {
        ensure_team_visible(conn, team_id, &user)?;

        let (id, name, description, created_at) = teams_dsl::teams
            .find(team_id)
            .select((
                teams_dsl::id,
                teams_dsl::name,
                teams_dsl::description,
                teams_dsl::created_at,
            ))
            .first::<(i64, String, String, DateTime<Utc>)>(conn)?;

        let members = tm_dsl::team_members
            .inner_join(users_dsl::users)
            .filter(tm_dsl::team_id.eq(team_id))
            .order(users_dsl::username.asc())
            .select((
                users_dsl::id,
                users_dsl::username,
                users_dsl::email,
                tm_dsl::joined_at,
            ))
            .load::<TeamMemberResponse>(conn)?;

        Ok(TeamDetailResponse {
            id,
            name,
            description,
            created_at,
            members,
        })
    })
    .await?;

    Ok(ApiResponse::ok(detail))
}

/// Adds a user to a team.
///
/// Request Body: `AddMemberPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `bool`: true (200 OK).
/// * `404 Not Found`: If the team or the user does not exist.
/// * `409 Conflict`: If the user already is a member.
#[instrument(skip(pool))]
pub async fn add_member(
    State(pool): State<Pool>,
    AdminUser(admin): AdminUser,
    Path(team_id): Path<i64>,
    Json(payload): Json<AddMemberPayload>,
) -> Result<ApiResponse<bool>, AppError> {
    let user_id = payload.user_id;
    info!(
        "Admin {} adding user {} to team {}",
        admin.user_id, user_id, team_id
    );

    helper::run_transaction(&pool, move |conn| {
        if !team_exists(conn, team_id)? {
            return Err(team_not_found(team_id));
        }
        let user_exists: bool = select(exists(users_dsl::users.find(user_id))).get_result(conn)?;
        if !user_exists {
            return Err(AppError::NotFound(format!(
                "User with ID {} not found.",
                user_id
            )));
        }
        if is_member(conn, team_id, user_id)? {
            return Err(AppError::Conflict(format!(
                "User {} is already a member of team {}.",
                user_id, team_id
            )));
        }

        diesel::insert_into(tm_dsl::team_members)
            .values(&NewTeamMember { team_id, user_id })
            .execute(conn)?;
        Ok(())
    })
    .await?;

    Ok(ApiResponse::ok(true))
}

#[instrument(skip(pool))]
pub async fn remove_member(
    State(pool): State<Pool>,
    AdminUser(admin): AdminUser,
    Path((team_id, user_id)): Path<(i64, i64)>,
) -> Result<ApiResponse<bool>, AppError> {
    info!(
        "Admin {} removing user {} from team {}",
        admin.user_id, user_id, team_id
    );

    let rows = helper::run_query(&pool, move |conn| {
        diesel::delete(
            tm_dsl::team_members
                .filter(tm_dsl::team_id.eq(team_id))
                .filter(tm_dsl::user_id.eq(user_id)),
        )
        .execute(conn)
    })
    .await?;

    if rows == 0 {
        error!("User {} is not a member of team {}", user_id, team_id);
        return Err(AppError::NotFound(format!(
            "User {} is not a member of team {}.",
            user_id, team_id
        )));
    }
    Ok(ApiResponse::ok(true))
}

/// Deletes a team. Memberships go with it; affectations stay with their users.
#[instrument(skip(pool))]
pub async fn delete_team(
    State(pool): State<Pool>,
    AdminUser(admin): AdminUser,
    Path(team_id): Path<i64>,
) -> Result<ApiResponse<bool>, AppError> {
    info!("Admin {} deleting team {}", admin.user_id, team_id);

    let rows = helper::run_query(&pool, move |conn| {
        diesel::delete(teams_dsl::teams.find(team_id)).execute(conn)
    })
    .await?;

    if rows == 0 {
        return Err(team_not_found(team_id));
    }
    Ok(ApiResponse::ok(true))
}

/// Teams the caller belongs to.
#[instrument(skip(pool))]
pub async fn my_teams(
    State(pool): State<Pool>,
    user: AuthUser,
) -> Result<ApiResponse<Vec<TeamSummaryResponse>>, AppError> {
    let user_id = user.user_id;

    let (teams, counts) = helper::run_query(&pool, move |conn| {
        let teams: Vec<(i64, String, String)> = teams_dsl::teams
            .inner_join(tm_dsl::team_members)
            .filter(tm_dsl::user_id.eq(user_id))
            .order(teams_dsl::name.asc())
            .select((teams_dsl::id, teams_dsl::name, teams_dsl::description))
            .load(conn)?;
        Ok((teams, member_counts(conn)?))
    })
    .await?;

    debug!("User {} belongs to {} teams", user_id, teams.len());
    Ok(ApiResponse::ok(summarize(teams, &counts)))
}

/// Ranks a team's members by their summed quiz and programming scores.
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<LeaderboardEntry>`: Members by total score descending, ties by username (200 OK).
/// * `403 Forbidden`: If the caller is neither admin nor member.
/// * `404 Not Found`: If the team does not exist.
#[instrument(skip(pool))]
pub async fn leaderboard(
    State(pool): State<Pool>,
    user: AuthUser,
    Path(team_id): Path<i64>,
) -> Result<ApiResponse<Vec<LeaderboardEntry>>, AppError> {
    let board = helper::run_transaction(&pool, move |conn| {
        ensure_team_visible(conn, team_id, &user)?;

        let members: Vec<(i64, String)> = tm_dsl::team_members
            .inner_join(users_dsl::users)
            .filter(tm_dsl::team_id.eq(team_id))
            .select((users_dsl::id, users_dsl::username))
            .load(conn)?;
        let member_ids: Vec<i64> = members.iter().map(|(id, _)| *id).collect();

        let quiz_scores: Vec<(Option<i64>, Option<i64>, i64)> = qh_dsl::quiz_history
            .filter(qh_dsl::user_id.eq_any(member_ids.clone()))
            .group_by(qh_dsl::user_id)
            .select((qh_dsl::user_id, sum(qh_dsl::score), count_star()))
            .load(conn)?;
        let prog_scores: Vec<(Option<i64>, Option<i64>, i64)> = ph_dsl::prog_history
            .filter(ph_dsl::user_id.eq_any(member_ids))
            .group_by(ph_dsl::user_id)
            .select((ph_dsl::user_id, sum(ph_dsl::score), count_star()))
            .load(conn)?;

        let mut totals: HashMap<i64, (i64, i64)> = HashMap::new();
        for (user_id, score, attempts) in quiz_scores.into_iter().chain(prog_scores) {
            if let Some(user_id) = user_id {
                let entry = totals.entry(user_id).or_default();
                entry.0 += score.unwrap_or(0);
                entry.1 += attempts;
            }
        }

        Ok(rank_members(members, &totals))
    })
    .await?;

    Ok(ApiResponse::ok(board))
}

fn rank_members(
    members: Vec<(i64, String)>,
    totals: &HashMap<i64, (i64, i64)>,
) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> = members
        .into_iter()
        .map(|(user_id, username)| {
            let (total_score, attempts) = totals.get(&user_id).copied().unwrap_or((0, 0));
            LeaderboardEntry {
                rank: 0,
                user_id,
                username,
                total_score,
                attempts,
            }
        })
        .collect();

    entries.sort_by(|a, b| {
        b.total_score
            .cmp(&a.total_score)
            .then_with(|| a.username.cmp(&b.username))
    });
    for (idx, entry) in entries.iter_mut().enumerate() {
        entry.rank = idx as i32 + 1;
    }
    entries
}

// ---------------------------------------------------------------------------
// Affectations
// ---------------------------------------------------------------------------

fn has_pending(conn: &mut PgConnection, user_id: i64, item: AssignedItem) -> QueryResult<bool> {
    let pending = aff_dsl::affectations
        .filter(aff_dsl::user_id.eq(user_id))
        .filter(aff_dsl::completed_at.is_null());
    match item {
        AssignedItem::Quiz(quiz_id) => {
            select(exists(pending.filter(aff_dsl::quiz_id.eq(quiz_id)))).get_result(conn)
        }
        AssignedItem::ProgProblem(problem_id) => select(exists(
            pending.filter(aff_dsl::prog_problem_id.eq(problem_id)),
        ))
        .get_result(conn),
    }
}

/// Assigns a quiz or programming problem to a user or to every member of a team.
///
/// Request Body: `CreateAffectationPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<i64>`: IDs of the created affectations; users with a pending one for the
///   same item are skipped (200 OK).
/// * `404 Not Found`: If the user, team, quiz or problem does not exist.
/// * `422 Unprocessable Entity`: If assignee or item is missing or ambiguous, or the team is empty.
#[instrument(skip(pool))]
pub async fn create_affectation(
    State(pool): State<Pool>,
    AdminUser(admin): AdminUser,
    Json(payload): Json<CreateAffectationPayload>,
) -> Result<ApiResponse<Vec<i64>>, AppError> {
    let (assignee, item) = payload.resolve()?;
    let due_at = payload.due_at;
    info!(
        "Admin {} assigning {:?} to {:?}",
        admin.user_id, item, assignee
    );

    let created = helper::run_transaction(&pool, move |conn| {
        let item_exists: bool = match item {
            AssignedItem::Quiz(id) => {
                select(exists(quizzes_dsl::quizzes.find(id))).get_result(conn)?
            }
            AssignedItem::ProgProblem(id) => {
                select(exists(problems_dsl::prog_problems.find(id))).get_result(conn)?
            }
        };
        if !item_exists {
            return Err(match item {
                AssignedItem::Quiz(id) => {
                    AppError::NotFound(format!("Quiz with ID {} not found.", id))
                }
                AssignedItem::ProgProblem(id) => {
                    AppError::NotFound(format!("Programming problem with ID {} not found.", id))
                }
            });
        }

        let (user_ids, team_id) = match assignee {
            Assignee::User(user_id) => {
                let user_exists: bool =
                    select(exists(users_dsl::users.find(user_id))).get_result(conn)?;
                if !user_exists {
                    return Err(AppError::NotFound(format!(
                        "User with ID {} not found.",
                        user_id
                    )));
                }
                (vec![user_id], None)
            }
            Assignee::Team(team_id) => {
                if !team_exists(conn, team_id)? {
                    return Err(team_not_found(team_id));
                }
                let members: Vec<i64> = tm_dsl::team_members
                    .filter(tm_dsl::team_id.eq(team_id))
                    .select(tm_dsl::user_id)
                    .order(tm_dsl::user_id.asc())
                    .load(conn)?;
                if members.is_empty() {
                    return Err(AppError::UnprocessableEntity(format!(
                        "Team {} has no members to assign.",
                        team_id
                    )));
                }
                (members, Some(team_id))
            }
        };

        let mut rows = Vec::with_capacity(user_ids.len());
        for user_id in user_ids {
            if has_pending(conn, user_id, item)? {
                debug!("User {} already has this item pending, skipping", user_id);
                continue;
            }
            let (quiz_id, prog_problem_id) = match item {
                AssignedItem::Quiz(id) => (Some(id), None),
                AssignedItem::ProgProblem(id) => (None, Some(id)),
            };
            rows.push(NewAffectation {
                user_id,
                quiz_id,
                prog_problem_id,
                team_id,
                due_at,
            });
        }

        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids = diesel::insert_into(aff_dsl::affectations)
            .values(&rows)
            .returning(aff_dsl::id)
            .get_results::<i64>(conn)?;
        Ok(ids)
    })
    .await?;

    info!("Created {} affectations", created.len());
    Ok(ApiResponse::ok(created))
}

/// Lists affectations, optionally filtered by user, quiz or problem.
#[instrument(skip(pool))]
pub async fn list_affectations(
    State(pool): State<Pool>,
    AdminUser(_admin): AdminUser,
    Query(params): Query<ListAffectationsParams>,
) -> Result<ApiResponse<Vec<Affectation>>, AppError> {
    let affectations = helper::run_query(&pool, move |conn| {
        let mut query = aff_dsl::affectations
            .select(Affectation::as_select())
            .order(aff_dsl::id.asc())
            .into_boxed();
        if let Some(user_id) = params.user_id {
            query = query.filter(aff_dsl::user_id.eq(user_id));
        }
        if let Some(quiz_id) = params.quiz_id {
            query = query.filter(aff_dsl::quiz_id.eq(quiz_id));
        }
        if let Some(problem_id) = params.prog_problem_id {
            query = query.filter(aff_dsl::prog_problem_id.eq(problem_id));
        }
        query.load::<Affectation>(conn)
    })
    .await?;

    Ok(ApiResponse::ok(affectations))
}

#[instrument(skip(pool))]
pub async fn delete_affectation(
    State(pool): State<Pool>,
    AdminUser(admin): AdminUser,
    Path(affectation_id): Path<i64>,
) -> Result<ApiResponse<bool>, AppError> {
    info!(
        "Admin {} deleting affectation {}",
        admin.user_id, affectation_id
    );

    let rows = helper::run_query(&pool, move |conn| {
        diesel::delete(aff_dsl::affectations.find(affectation_id)).execute(conn)
    })
    .await?;

    if rows == 0 {
        return Err(AppError::NotFound(format!(
            "Affectation with ID {} not found.",
            affectation_id
        )));
    }
    Ok(ApiResponse::ok(true))
}

/// The caller's affectations, newest first, with item titles and overdue flags.
#[instrument(skip(pool))]
pub async fn my_affectations(
    State(pool): State<Pool>,
    user: AuthUser,
) -> Result<ApiResponse<Vec<MyAffectationResponse>>, AppError> {
    let user_id = user.user_id;

    let (affectations, quiz_titles, problem_titles) = helper::run_query(&pool, move |conn| {
        let affectations = aff_dsl::affectations
            .filter(aff_dsl::user_id.eq(user_id))
            .order((aff_dsl::assigned_at.desc(), aff_dsl::id.desc()))
            .select(Affectation::as_select())
            .load::<Affectation>(conn)?;

        let quiz_ids: Vec<i64> = affectations.iter().filter_map(|a| a.quiz_id).collect();
        let problem_ids: Vec<i64> = affectations
            .iter()
            .filter_map(|a| a.prog_problem_id)
            .collect();

        let quiz_titles: Vec<(i64, String)> = quizzes_dsl::quizzes
            .filter(quizzes_dsl::id.eq_any(quiz_ids))
            .select((quizzes_dsl::id, quizzes_dsl::title))
            .load(conn)?;
        let problem_titles: Vec<(i64, String)> = problems_dsl::prog_problems
            .filter(problems_dsl::id.eq_any(problem_ids))
            .select((problems_dsl::id, problems_dsl::title))
            .load(conn)?;

        Ok((affectations, quiz_titles, problem_titles))
    })
    .await?;

    let quiz_titles: HashMap<i64, String> = quiz_titles.into_iter().collect();
    let problem_titles: HashMap<i64, String> = problem_titles.into_iter().collect();
    let now = Utc::now();

    let response = affectations
        .into_iter()
        .map(|a| {
            let title = a
                .quiz_id
                .and_then(|id| quiz_titles.get(&id))
                .or_else(|| a.prog_problem_id.and_then(|id| problem_titles.get(&id)))
                .cloned()
                .unwrap_or_default();
            MyAffectationResponse {
                id: a.id,
                quiz_id: a.quiz_id,
                prog_problem_id: a.prog_problem_id,
                title,
                team_id: a.team_id,
                assigned_at: a.assigned_at,
                due_at: a.due_at,
                completed_at: a.completed_at,
                completed: a.completed_at.is_some(),
                overdue: a.is_overdue(now),
            }
        })
        .collect();

    Ok(ApiResponse::ok(response))
}
