use super::catalog::load_quiz_questions;
use super::helper;
use crate::auth::{AdminUser, AuthUser};
use crate::model::history::{
    DashboardResponse, MyHistoryResponse, ProgHistoryEntry, QuestionStats, QuizHistoryEntry,
    QuizStatsResponse,
};
use crate::model::play::STATUS_COMPLETED;
use crate::payloads::history::{ProgHistoryParams, QuizHistoryParams};
use crate::{
    errors::AppError,
    response::ApiResponse,
    schema::{
        attempt_answers::dsl as answers_dsl, languages::dsl as languages_dsl,
        prog_attempts::dsl as pa_dsl, prog_history::dsl as ph_dsl,
        prog_problems::dsl as problems_dsl, questions::dsl as questions_dsl,
        quiz_attempts::dsl as attempts_dsl, quiz_history::dsl as qh_dsl,
        quizzes::dsl as quizzes_dsl, teams::dsl as teams_dsl, users::dsl as users_dsl,
    },
};
use axum::extract::{Path, Query, State};
use bigdecimal::BigDecimal;
use deadpool_diesel::postgres::Pool;
use diesel::dsl::{avg, count_star, exists, select};
use diesel::prelude::*;
use std::collections::HashMap;
use tracing::{debug, info, instrument};

/// Columns of `quiz_history` joined with the quiz title, in `QuizHistoryEntry` order.
macro_rules! quiz_history_columns {
    () => {
        (
            qh_dsl::id,
            qh_dsl::quiz_id,
            quizzes_dsl::title,
            qh_dsl::user_id,
            qh_dsl::participant_name,
            qh_dsl::score,
            qh_dsl::total_points,
            qh_dsl::percentage,
            qh_dsl::correct_count,
            qh_dsl::question_count,
            qh_dsl::completed_at,
        )
    };
}

macro_rules! prog_history_columns {
    () => {
        (
            ph_dsl::id,
            ph_dsl::prog_problem_id,
            problems_dsl::title,
            ph_dsl::user_id,
            ph_dsl::participant_name,
            ph_dsl::score,
            ph_dsl::total_points,
            ph_dsl::percentage,
            ph_dsl::solved_tasks,
            ph_dsl::task_count,
            ph_dsl::completed_at,
        )
    };
}

/// The caller's finished quizzes and programming problems, newest first.
#[instrument(skip(pool))]
pub async fn my_history(
    State(pool): State<Pool>,
    user: AuthUser,
) -> Result<ApiResponse<MyHistoryResponse>, AppError> {
    let user_id = user.user_id;

    let history = helper::run_query(&pool, move |conn| {
        let quizzes = qh_dsl::quiz_history
            .inner_join(quizzes_dsl::quizzes)
            .filter(qh_dsl::user_id.eq(user_id))
            .order((qh_dsl::completed_at.desc(), qh_dsl::id.desc()))
            .select(quiz_history_columns!())
            .load::<QuizHistoryEntry>(conn)?;
        let prog_problems = ph_dsl::prog_history
            .inner_join(problems_dsl::prog_problems)
            .filter(ph_dsl::user_id.eq(user_id))
            .order((ph_dsl::completed_at.desc(), ph_dsl::id.desc()))
            .select(prog_history_columns!())
            .load::<ProgHistoryEntry>(conn)?;
        Ok(MyHistoryResponse {
            quizzes,
            prog_problems,
        })
    })
    .await?;

    debug!(
        "User {} has {} quiz and {} problem history entries",
        user_id,
        history.quizzes.len(),
        history.prog_problems.len()
    );
    Ok(ApiResponse::ok(history))
}

/// Quiz history across all participants, newest first.
///
/// Query Parameters:
/// * `quiz_id`: Optional quiz filter.
/// * `user_id`: Optional participant filter.
#[instrument(skip(pool))]
pub async fn quiz_history(
    State(pool): State<Pool>,
    AdminUser(_admin): AdminUser,
    Query(params): Query<QuizHistoryParams>,
) -> Result<ApiResponse<Vec<QuizHistoryEntry>>, AppError> {
    let entries = helper::run_query(&pool, move |conn| {
        let mut query = qh_dsl::quiz_history
            .inner_join(quizzes_dsl::quizzes)
            .select(quiz_history_columns!())
            .order((qh_dsl::completed_at.desc(), qh_dsl::id.desc()))
            .into_boxed();
        if let Some(quiz_id) = params.quiz_id {
            query = query.filter(qh_dsl::quiz_id.eq(quiz_id));
        }
        if let Some(user_id) = params.user_id {
            query = query.filter(qh_dsl::user_id.eq(user_id));
        }
        query.load::<QuizHistoryEntry>(conn)
    })
    .await?;

    Ok(ApiResponse::ok(entries))
}

/// Programming problem history across all participants, newest first.
///
/// Query Parameters:
/// * `prog_problem_id`: Optional problem filter.
/// * `user_id`: Optional participant filter.
#[instrument(skip(pool))]
pub async fn prog_history(
    State(pool): State<Pool>,
    AdminUser(_admin): AdminUser,
    Query(params): Query<ProgHistoryParams>,
) -> Result<ApiResponse<Vec<ProgHistoryEntry>>, AppError> {
    let entries = helper::run_query(&pool, move |conn| {
        let mut query = ph_dsl::prog_history
            .inner_join(problems_dsl::prog_problems)
            .select(prog_history_columns!())
            .order((ph_dsl::completed_at.desc(), ph_dsl::id.desc()))
            .into_boxed();
        if let Some(problem_id) = params.prog_problem_id {
            query = query.filter(ph_dsl::prog_problem_id.eq(problem_id));
        }
        if let Some(user_id) = params.user_id {
            query = query.filter(ph_dsl::user_id.eq(user_id));
        }
        query.load::<ProgHistoryEntry>(conn)
    })
    .await?;

    Ok(ApiResponse::ok(entries))
}

fn correct_rate(correct: i64, answered: i64) -> f64 {
    if answered == 0 {
        0.0
    } else {
        correct as f64 / answered as f64
    }
}

/// Attempt counts, score percentages and per-question correctness for one quiz.
///
/// Returns (wrapped in `ApiResponse`)
/// * `QuizStatsResponse`: Aggregates over all attempts (200 OK).
/// * `404 Not Found`: If the quiz does not exist.
#[instrument(skip(pool))]
pub async fn quiz_stats(
    State(pool): State<Pool>,
    AdminUser(admin): AdminUser,
    Path(quiz_id): Path<i64>,
) -> Result<ApiResponse<QuizStatsResponse>, AppError> {
    info!("Admin {} requesting stats of quiz {}", admin.user_id, quiz_id);

    let stats = helper::run_transaction(&pool, move |conn| {
        let quiz_exists: bool =
            select(exists(quizzes_dsl::quizzes.find(quiz_id))).get_result(conn)?;
        if !quiz_exists {
            return Err(AppError::NotFound(format!(
                "Quiz with ID {} not found.",
                quiz_id
            )));
        }

        let attempts: i64 = attempts_dsl::quiz_attempts
            .filter(attempts_dsl::quiz_id.eq(quiz_id))
            .count()
            .get_result(conn)?;
        let completed: i64 = attempts_dsl::quiz_attempts
            .filter(attempts_dsl::quiz_id.eq(quiz_id))
            .filter(attempts_dsl::status.eq(STATUS_COMPLETED))
            .count()
            .get_result(conn)?;
        let average: Option<BigDecimal> = qh_dsl::quiz_history
            .filter(qh_dsl::quiz_id.eq(quiz_id))
            .select(avg(qh_dsl::percentage))
            .first(conn)?;
        let best: Option<BigDecimal> = qh_dsl::quiz_history
            .filter(qh_dsl::quiz_id.eq(quiz_id))
            .order(qh_dsl::percentage.desc())
            .select(qh_dsl::percentage)
            .first(conn)
            .optional()?;

        let answered: HashMap<i64, i64> = answers_dsl::attempt_answers
            .inner_join(attempts_dsl::quiz_attempts)
            .filter(attempts_dsl::quiz_id.eq(quiz_id))
            .group_by(answers_dsl::question_id)
            .select((answers_dsl::question_id, count_star()))
            .load::<(i64, i64)>(conn)?
            .into_iter()
            .collect();
        let correct: HashMap<i64, i64> = answers_dsl::attempt_answers
            .inner_join(attempts_dsl::quiz_attempts)
            .filter(attempts_dsl::quiz_id.eq(quiz_id))
            .filter(answers_dsl::correct.eq(true))
            .group_by(answers_dsl::question_id)
            .select((answers_dsl::question_id, count_star()))
            .load::<(i64, i64)>(conn)?
            .into_iter()
            .collect();

        let questions = load_quiz_questions(conn, quiz_id)?
            .into_iter()
            .map(|q| {
                let answered = answered.get(&q.id).copied().unwrap_or(0);
                let correct = correct.get(&q.id).copied().unwrap_or(0);
                QuestionStats {
                    question_id: q.id,
                    answered,
                    correct,
                    correct_rate: correct_rate(correct, answered),
                }
            })
            .collect();

        Ok(QuizStatsResponse {
            quiz_id,
            attempts,
            completed,
            average_percentage: average.map(|a| a.round(2)),
            best_percentage: best,
            questions,
        })
    })
    .await?;

    Ok(ApiResponse::ok(stats))
}

/// Platform-wide counters for the admin landing page.
#[instrument(skip(pool))]
pub async fn dashboard(
    State(pool): State<Pool>,
    AdminUser(admin): AdminUser,
) -> Result<ApiResponse<DashboardResponse>, AppError> {
    debug!("Admin {} loading dashboard", admin.user_id);

    let counts = helper::run_query(&pool, |conn| {
        Ok(DashboardResponse {
            users: users_dsl::users.count().get_result(conn)?,
            languages: languages_dsl::languages.count().get_result(conn)?,
            questions: questions_dsl::questions.count().get_result(conn)?,
            quizzes: quizzes_dsl::quizzes.count().get_result(conn)?,
            prog_problems: problems_dsl::prog_problems.count().get_result(conn)?,
            teams: teams_dsl::teams.count().get_result(conn)?,
            completed_quiz_attempts: attempts_dsl::quiz_attempts
                .filter(attempts_dsl::status.eq(STATUS_COMPLETED))
                .count()
                .get_result(conn)?,
            completed_prog_attempts: pa_dsl::prog_attempts
                .filter(pa_dsl::status.eq(STATUS_COMPLETED))
                .count()
                .get_result(conn)?,
        })
    })
    .await?;

    Ok(ApiResponse::ok(counts))
}
