use super::attempt::{complete_affectation, participant_name, resolve_participant};
use super::catalog::load_tasks;
use super::helper;
use crate::auth::MaybeAuthUser;
use crate::model::catalog::{ProgProblem, Task};
use crate::model::play::{
    NewProgAttempt, NewProgHistory, NewTaskSubmission, ProgAttempt, ProgJoinResponse,
    ProgResultResponse, ProgTaskView, STATUS_COMPLETED, SubmissionOutcomeResponse, TaskReview,
};
use crate::payloads::play::{SubmitTaskPayload, VerifyCodePayload};
use crate::scoring::{ProgSummary, evaluate_code};
use crate::{
    errors::AppError,
    response::ApiResponse,
    schema::{
        prog_attempts::dsl as pa_dsl, prog_history::dsl as ph_dsl,
        prog_problems::dsl as problems_dsl, task_submissions::dsl as subs_dsl,
        tasks::dsl as tasks_dsl,
    },
};
use axum::{
    Json,
    extract::{Path, State},
};
use chrono::{DateTime, Duration, Utc};
use deadpool_diesel::postgres::Pool;
use diesel::dsl::{count_star, max};
use diesel::prelude::*;
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Best points and number of submissions per task of one attempt.
type TaskProgress = HashMap<i64, (Option<i32>, i64)>;

fn task_progress(conn: &mut PgConnection, attempt_id: i64) -> QueryResult<TaskProgress> {
    let rows: Vec<(i64, Option<i32>, i64)> = subs_dsl::task_submissions
        .filter(subs_dsl::prog_attempt_id.eq(attempt_id))
        .group_by(subs_dsl::task_id)
        .select((subs_dsl::task_id, max(subs_dsl::points_awarded), count_star()))
        .load(conn)?;
    Ok(rows
        .into_iter()
        .map(|(task_id, best, submissions)| (task_id, (best, submissions)))
        .collect())
}

fn prog_result(tasks: &[Task], progress: &TaskProgress) -> ProgResultResponse {
    let best_of = |task: &Task| progress.get(&task.id).and_then(|(best, _)| *best);
    let summary = ProgSummary::from_tasks(tasks.iter().map(|t| (t.points, best_of(t))));

    ProgResultResponse {
        score: summary.score,
        total_points: summary.total_points,
        percentage: summary.percentage(),
        solved_tasks: summary.solved_tasks,
        task_count: summary.task_count,
        tasks: tasks
            .iter()
            .map(|task| TaskReview {
                task_id: task.id,
                title: task.title.clone(),
                points: task.points,
                best_points: best_of(task),
            })
            .collect(),
    }
}

/// Opens a new attempt on `problem`; the deadline is the sum of all task limits.
///
/// An affectation owns at most one attempt: starting it again resumes that
/// attempt with its original deadline.
pub(super) fn start_prog_attempt(
    conn: &mut PgConnection,
    problem: &ProgProblem,
    user_id: Option<i64>,
    guest_name: Option<String>,
    affectation_id: Option<i64>,
) -> Result<ProgJoinResponse, AppError> {
    if !problem.active {
        warn!("Attempt to join inactive programming problem {}", problem.id);
        return Err(AppError::Forbidden(format!(
            "Programming problem {} is not active.",
            problem.id
        )));
    }

    let tasks = load_tasks(conn, problem.id)?;
    if tasks.is_empty() {
        return Err(AppError::Conflict(format!(
            "Programming problem {} has no tasks.",
            problem.id
        )));
    }

    let total_time_seconds: i32 = tasks.iter().map(|t| t.time_limit_seconds).sum();

    let resumed = match affectation_id {
        Some(id) => pa_dsl::prog_attempts
            .filter(pa_dsl::affectation_id.eq(id))
            .select((pa_dsl::token, pa_dsl::deadline))
            .first::<(Uuid, DateTime<Utc>)>(conn)
            .optional()?,
        None => None,
    };

    let (token, deadline) = match resumed {
        Some(existing) => {
            debug!(
                "Resuming programming attempt {} of affectation {:?}",
                existing.0, affectation_id
            );
            existing
        }
        None => {
            let deadline = Utc::now() + Duration::seconds(i64::from(total_time_seconds));
            diesel::insert_into(pa_dsl::prog_attempts)
                .values(&NewProgAttempt {
                    token: Uuid::new_v4(),
                    prog_problem_id: problem.id,
                    user_id,
                    guest_name,
                    affectation_id,
                    deadline,
                })
                .returning((pa_dsl::token, pa_dsl::deadline))
                .get_result::<(Uuid, DateTime<Utc>)>(conn)?
        }
    };

    Ok(ProgJoinResponse {
        attempt_token: token,
        prog_problem_id: problem.id,
        title: problem.title.clone(),
        description: problem.description.clone(),
        task_count: tasks.len() as i32,
        total_points: tasks.iter().map(|t| t.points).sum(),
        total_time_seconds,
        deadline,
    })
}

fn find_attempt(
    conn: &mut PgConnection,
    token: Uuid,
    lock: bool,
) -> Result<ProgAttempt, AppError> {
    let query = pa_dsl::prog_attempts
        .filter(pa_dsl::token.eq(token))
        .select(ProgAttempt::as_select());
    let attempt = if lock {
        query.for_update().first::<ProgAttempt>(conn).optional()?
    } else {
        query.first::<ProgAttempt>(conn).optional()?
    };
    attempt.ok_or_else(|| AppError::NotFound(format!("Attempt {} not found.", token)))
}

fn ensure_in_progress(attempt: &ProgAttempt) -> Result<(), AppError> {
    if attempt.is_completed() {
        return Err(AppError::Conflict(format!(
            "Attempt {} is already completed.",
            attempt.token
        )));
    }
    Ok(())
}

/// Closes the attempt, writes its history row and completes its affectation.
fn finalize_prog_attempt(
    conn: &mut PgConnection,
    attempt: &ProgAttempt,
    now: DateTime<Utc>,
) -> Result<ProgResultResponse, AppError> {
    let tasks = load_tasks(conn, attempt.prog_problem_id)?;
    let progress = task_progress(conn, attempt.id)?;
    let result = prog_result(&tasks, &progress);

    diesel::update(pa_dsl::prog_attempts.find(attempt.id))
        .set((
            pa_dsl::status.eq(STATUS_COMPLETED),
            pa_dsl::finished_at.eq(now),
        ))
        .execute(conn)?;

    let participant = participant_name(conn, attempt.user_id, attempt.guest_name.as_deref())?;
    diesel::insert_into(ph_dsl::prog_history)
        .values(&NewProgHistory {
            prog_problem_id: attempt.prog_problem_id,
            prog_attempt_id: attempt.id,
            user_id: attempt.user_id,
            participant_name: participant,
            score: result.score,
            total_points: result.total_points,
            percentage: result.percentage.clone(),
            solved_tasks: result.solved_tasks,
            task_count: result.task_count,
        })
        .execute(conn)?;

    complete_affectation(conn, attempt.affectation_id, now)?;

    info!(
        "Programming attempt {} finalized with score {}/{}",
        attempt.id, result.score, result.total_points
    );
    Ok(result)
}

/// Joins a programming problem by access code, as a logged-in user or as a named guest.
///
/// Request Body: `VerifyCodePayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `ProgJoinResponse`: Attempt token, problem overview and deadline (200 OK).
/// * `403 Forbidden`: If the problem is inactive.
/// * `404 Not Found`: If no problem has this code.
/// * `409 Conflict`: If the problem has no tasks.
/// * `422 Unprocessable Entity`: If a guest joins without a name.
#[instrument(skip(pool))]
pub async fn verify_code(
    State(pool): State<Pool>,
    MaybeAuthUser(user): MaybeAuthUser,
    Json(payload): Json<VerifyCodePayload>,
) -> Result<ApiResponse<ProgJoinResponse>, AppError> {
    let code = helper::normalize_access_code(&payload.code);
    info!("Verifying programming problem access code {}", code);

    let joined = helper::run_transaction(&pool, move |conn| {
        let problem = problems_dsl::prog_problems
            .filter(problems_dsl::access_code.eq(&code))
            .select(ProgProblem::as_select())
            .first::<ProgProblem>(conn)
            .optional()?
            .ok_or_else(|| {
                warn!("No programming problem matches access code {}", code);
                AppError::NotFound(format!("No programming problem found for code {}.", code))
            })?;
        let (user_id, guest_name) =
            resolve_participant(user.as_ref(), payload.guest_name.as_deref())?;
        start_prog_attempt(conn, &problem, user_id, guest_name, None)
    })
    .await?;

    info!(
        "Programming attempt {} started on problem {}",
        joined.attempt_token, joined.prog_problem_id
    );
    Ok(ApiResponse::ok(joined))
}

/// Lists the attempt's tasks without model solutions, with the best points so far.
#[instrument(skip(pool))]
pub async fn tasks(
    State(pool): State<Pool>,
    Path(token): Path<Uuid>,
) -> Result<ApiResponse<Vec<ProgTaskView>>, AppError> {
    let views = helper::run_transaction(&pool, move |conn| {
        let attempt = find_attempt(conn, token, false)?;
        let tasks = load_tasks(conn, attempt.prog_problem_id)?;
        let progress = task_progress(conn, attempt.id)?;

        Ok(tasks
            .into_iter()
            .map(|task| {
                let (best_points, submissions) =
                    progress.get(&task.id).copied().unwrap_or((None, 0));
                ProgTaskView {
                    task_id: task.id,
                    position: task.position,
                    title: task.title,
                    statement: task.statement,
                    points: task.points,
                    time_limit_seconds: task.time_limit_seconds,
                    best_points,
                    submissions,
                }
            })
            .collect::<Vec<_>>())
    })
    .await?;

    Ok(ApiResponse::ok(views))
}

enum SubmitOutcome {
    Evaluated(SubmissionOutcomeResponse),
    Expired,
}

/// Evaluates a submission for one task of the attempt.
///
/// Request Body: `SubmitTaskPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `SubmissionOutcomeResponse`: Similarity to the model solution and points earned (200 OK).
/// * `404 Not Found`: If the token is unknown or the task is not part of the problem.
/// * `409 Conflict`: If the attempt is completed or its deadline has passed. A late
///   submission finalizes the attempt.
#[instrument(skip(pool, payload))]
pub async fn submit(
    State(pool): State<Pool>,
    Path(token): Path<Uuid>,
    Json(payload): Json<SubmitTaskPayload>,
) -> Result<ApiResponse<SubmissionOutcomeResponse>, AppError> {
    info!(
        "Submission for task {} on attempt {}",
        payload.task_id, token
    );

    let outcome = helper::run_transaction(&pool, move |conn| {
        let attempt = find_attempt(conn, token, true)?;
        ensure_in_progress(&attempt)?;

        let now = Utc::now();
        if now > attempt.deadline {
            warn!(
                "Submission on attempt {} after its deadline {}",
                attempt.id, attempt.deadline
            );
            finalize_prog_attempt(conn, &attempt, now)?;
            return Ok(SubmitOutcome::Expired);
        }

        let task = tasks_dsl::tasks
            .find(payload.task_id)
            .filter(tasks_dsl::prog_problem_id.eq(attempt.prog_problem_id))
            .select(Task::as_select())
            .first::<Task>(conn)
            .optional()?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Task {} is not part of this problem.",
                    payload.task_id
                ))
            })?;

        let evaluation = evaluate_code(&payload.code, &task.model_solution, task.points);
        diesel::insert_into(subs_dsl::task_submissions)
            .values(&NewTaskSubmission {
                prog_attempt_id: attempt.id,
                task_id: task.id,
                code: payload.code,
                similarity: evaluation.similarity,
                points_awarded: evaluation.points_awarded,
            })
            .execute(conn)?;

        Ok(SubmitOutcome::Evaluated(SubmissionOutcomeResponse {
            task_id: task.id,
            similarity: evaluation.similarity,
            points_awarded: evaluation.points_awarded,
            passed: evaluation.passed,
        }))
    })
    .await?;

    match outcome {
        SubmitOutcome::Evaluated(response) => {
            debug!(
                "Task {} scored {} (similarity {:.3})",
                response.task_id, response.points_awarded, response.similarity
            );
            Ok(ApiResponse::ok(response))
        }
        SubmitOutcome::Expired => Err(AppError::Conflict(format!(
            "The deadline of attempt {} has passed; the attempt has been closed.",
            token
        ))),
    }
}

/// Ends an attempt and returns its result.
#[instrument(skip(pool))]
pub async fn finish(
    State(pool): State<Pool>,
    Path(token): Path<Uuid>,
) -> Result<ApiResponse<ProgResultResponse>, AppError> {
    info!("Finishing programming attempt {}", token);

    let result = helper::run_transaction(&pool, move |conn| {
        let attempt = find_attempt(conn, token, true)?;
        ensure_in_progress(&attempt)?;
        finalize_prog_attempt(conn, &attempt, Utc::now())
    })
    .await?;

    Ok(ApiResponse::ok(result))
}

/// Returns the result of a completed programming attempt.
///
/// Returns (wrapped in `ApiResponse`)
/// * `ProgResultResponse`: Totals and best points per task (200 OK).
/// * `404 Not Found`: If the token is unknown.
/// * `409 Conflict`: If the attempt is still in progress.
#[instrument(skip(pool))]
pub async fn result(
    State(pool): State<Pool>,
    Path(token): Path<Uuid>,
) -> Result<ApiResponse<ProgResultResponse>, AppError> {
    let result = helper::run_transaction(&pool, move |conn| {
        let attempt = find_attempt(conn, token, false)?;
        if !attempt.is_completed() {
            return Err(AppError::Conflict(format!(
                "Attempt {} is still in progress.",
                token
            )));
        }
        let tasks = load_tasks(conn, attempt.prog_problem_id)?;
        let progress = task_progress(conn, attempt.id)?;
        Ok(prog_result(&tasks, &progress))
    })
    .await?;

    Ok(ApiResponse::ok(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: i64, points: i32) -> Task {
        Task {
            id,
            prog_problem_id: 1,
            position: id as i32,
            title: format!("Task {}", id),
            statement: "Do it".to_string(),
            model_solution: "x".to_string(),
            points,
            time_limit_seconds: 60,
        }
    }

    #[test]
    fn result_uses_best_submission_per_task() {
        let tasks = vec![task(1, 10), task(2, 20), task(3, 5)];
        let progress: TaskProgress =
            HashMap::from([(1, (Some(9), 3)), (2, (Some(0), 1))]);

        let result = prog_result(&tasks, &progress);
        assert_eq!(result.score, 9);
        assert_eq!(result.total_points, 35);
        assert_eq!(result.solved_tasks, 1);
        assert_eq!(result.task_count, 3);
        assert_eq!(result.tasks[0].best_points, Some(9));
        assert_eq!(result.tasks[2].best_points, None);
    }
}
