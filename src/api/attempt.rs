use super::catalog::load_quiz_questions;
use super::{helper, prog};
use crate::auth::{AuthUser, MaybeAuthUser};
use crate::model::catalog::{ProgProblem, Question, Quiz};
use crate::model::play::{
    AnswerOutcomeResponse, AnswerReview, AttemptAnswer, CurrentQuestionResponse, JoinResponse,
    NewAttemptAnswer, NewQuizAttempt, NewQuizHistory, QuizAttempt, QuizJoinResponse,
    QuizResultResponse, STATUS_COMPLETED,
};
use crate::model::team::Affectation;
use crate::payloads::play::{AnswerPayload, VerifyCodePayload};
use crate::scoring::{AnswerGrade, QuizSummary, grade_answer, remaining_seconds};
use crate::{
    errors::AppError,
    response::ApiResponse,
    schema::{
        affectations::dsl as aff_dsl, attempt_answers::dsl as answers_dsl,
        prog_problems::dsl as problems_dsl, quiz_attempts::dsl as attempts_dsl,
        quiz_history::dsl as qh_dsl, quizzes::dsl as quizzes_dsl, users::dsl as users_dsl,
    },
};
use axum::{
    Json,
    extract::{Path, State},
};
use chrono::{DateTime, Utc};
use deadpool_diesel::postgres::Pool;
use diesel::prelude::*;
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Who is taking an attempt: an account, or a named guest.
pub(super) fn resolve_participant(
    user: Option<&AuthUser>,
    guest_name: Option<&str>,
) -> Result<(Option<i64>, Option<String>), AppError> {
    match user {
        Some(user) => Ok((Some(user.user_id), None)),
        None => {
            let name = helper::required_text(
                guest_name.unwrap_or_default(),
                "guest_name",
                helper::NAME_MAX_LENGTH,
            )?;
            Ok((None, Some(name)))
        }
    }
}

/// Name recorded in history rows: the account's username, else the guest name.
pub(super) fn participant_name(
    conn: &mut PgConnection,
    user_id: Option<i64>,
    guest_name: Option<&str>,
) -> QueryResult<String> {
    let username = match user_id {
        Some(id) => users_dsl::users
            .find(id)
            .select(users_dsl::username)
            .first::<String>(conn)
            .optional()?,
        None => None,
    };
    Ok(username
        .or_else(|| guest_name.map(str::to_string))
        .unwrap_or_else(|| "guest".to_string()))
}

/// Marks the affectation an attempt was started from as completed.
pub(super) fn complete_affectation(
    conn: &mut PgConnection,
    affectation_id: Option<i64>,
    now: DateTime<Utc>,
) -> QueryResult<()> {
    if let Some(id) = affectation_id {
        diesel::update(
            aff_dsl::affectations
                .find(id)
                .filter(aff_dsl::completed_at.is_null()),
        )
        .set(aff_dsl::completed_at.eq(now))
        .execute(conn)?;
    }
    Ok(())
}

/// Opens a new attempt on `quiz` and describes it to the participant.
///
/// An affectation owns at most one attempt: starting it again resumes that attempt.
fn start_quiz_attempt(
    conn: &mut PgConnection,
    quiz: &Quiz,
    user_id: Option<i64>,
    guest_name: Option<String>,
    affectation_id: Option<i64>,
) -> Result<QuizJoinResponse, AppError> {
    if !quiz.active {
        warn!("Attempt to join inactive quiz {}", quiz.id);
        return Err(AppError::Forbidden(format!(
            "Quiz {} is not active.",
            quiz.id
        )));
    }

    let questions = load_quiz_questions(conn, quiz.id)?;
    if questions.is_empty() {
        return Err(AppError::Conflict(format!(
            "Quiz {} has no questions.",
            quiz.id
        )));
    }

    let resumed = match affectation_id {
        Some(id) => attempts_dsl::quiz_attempts
            .filter(attempts_dsl::affectation_id.eq(id))
            .select(attempts_dsl::token)
            .first::<Uuid>(conn)
            .optional()?,
        None => None,
    };

    let token = match resumed {
        Some(token) => {
            debug!("Resuming attempt {} of affectation {:?}", token, affectation_id);
            token
        }
        None => diesel::insert_into(attempts_dsl::quiz_attempts)
            .values(&NewQuizAttempt {
                token: Uuid::new_v4(),
                quiz_id: quiz.id,
                user_id,
                guest_name,
                affectation_id,
            })
            .returning(attempts_dsl::token)
            .get_result::<Uuid>(conn)?,
    };

    Ok(QuizJoinResponse {
        attempt_token: token,
        quiz_id: quiz.id,
        title: quiz.title.clone(),
        description: quiz.description.clone(),
        question_count: questions.len() as i32,
        total_points: questions.iter().map(|q| q.points).sum(),
        total_time_seconds: questions.iter().map(|q| q.time_limit_seconds).sum(),
    })
}

fn load_attempt_for_update(conn: &mut PgConnection, token: Uuid) -> Result<QuizAttempt, AppError> {
    attempts_dsl::quiz_attempts
        .filter(attempts_dsl::token.eq(token))
        .select(QuizAttempt::as_select())
        .for_update()
        .first::<QuizAttempt>(conn)
        .optional()?
        .ok_or_else(|| AppError::NotFound(format!("Attempt {} not found.", token)))
}

fn ensure_in_progress(attempt: &QuizAttempt) -> Result<(), AppError> {
    if attempt.is_completed() {
        return Err(AppError::Conflict(format!(
            "Attempt {} is already completed.",
            attempt.token
        )));
    }
    Ok(())
}

fn current_of<'a>(attempt: &QuizAttempt, questions: &'a [Question]) -> Result<&'a Question, AppError> {
    usize::try_from(attempt.current_index)
        .ok()
        .and_then(|idx| questions.get(idx))
        .ok_or_else(|| {
            AppError::Conflict(format!(
                "Attempt {} has no question left to answer.",
                attempt.token
            ))
        })
}

/// Builds the graded review. Questions never answered count as wrong with no points.
fn quiz_result(questions: &[Question], answers: &[AttemptAnswer]) -> QuizResultResponse {
    let by_question: HashMap<i64, &AttemptAnswer> =
        answers.iter().map(|a| (a.question_id, a)).collect();

    let reviews: Vec<(i32, AnswerGrade, AnswerReview)> = questions
        .iter()
        .map(|question| {
            let answer = by_question.get(&question.id);
            let grade = answer.map_or(AnswerGrade::unanswered(), |a| AnswerGrade {
                correct: a.correct,
                timed_out: a.timed_out,
                points_awarded: a.points_awarded,
            });
            let review = AnswerReview {
                question_id: question.id,
                prompt: question.prompt.clone(),
                selected: answer.and_then(|a| a.selected.clone()),
                correct_answer: question.correct_answer.clone(),
                correct: grade.correct,
                timed_out: grade.timed_out,
                points_awarded: grade.points_awarded,
            };
            (question.points, grade, review)
        })
        .collect();

    let summary = QuizSummary::from_grades(reviews.iter().map(|(points, grade, _)| (*points, *grade)));

    QuizResultResponse {
        score: summary.score,
        total_points: summary.total_points,
        percentage: summary.percentage(),
        correct_count: summary.correct_count,
        question_count: summary.question_count,
        answers: reviews.into_iter().map(|(_, _, review)| review).collect(),
    }
}

fn load_answers(conn: &mut PgConnection, attempt_id: i64) -> QueryResult<Vec<AttemptAnswer>> {
    answers_dsl::attempt_answers
        .filter(answers_dsl::attempt_id.eq(attempt_id))
        .select(AttemptAnswer::as_select())
        .load::<AttemptAnswer>(conn)
}

/// Closes the attempt, writes its history row and completes its affectation.
fn finalize_quiz_attempt(
    conn: &mut PgConnection,
    attempt: &QuizAttempt,
    questions: &[Question],
    now: DateTime<Utc>,
) -> Result<QuizResultResponse, AppError> {
    let answers = load_answers(conn, attempt.id)?;
    let result = quiz_result(questions, &answers);

    diesel::update(attempts_dsl::quiz_attempts.find(attempt.id))
        .set((
            attempts_dsl::status.eq(STATUS_COMPLETED),
            attempts_dsl::finished_at.eq(now),
            attempts_dsl::score.eq(result.score),
            attempts_dsl::question_started_at.eq(None::<DateTime<Utc>>),
        ))
        .execute(conn)?;

    let participant = participant_name(conn, attempt.user_id, attempt.guest_name.as_deref())?;
    diesel::insert_into(qh_dsl::quiz_history)
        .values(&NewQuizHistory {
            quiz_id: attempt.quiz_id,
            attempt_id: attempt.id,
            user_id: attempt.user_id,
            participant_name: participant,
            score: result.score,
            total_points: result.total_points,
            percentage: result.percentage.clone(),
            correct_count: result.correct_count,
            question_count: result.question_count,
        })
        .execute(conn)?;

    complete_affectation(conn, attempt.affectation_id, now)?;

    info!(
        "Quiz attempt {} finalized with score {}/{}",
        attempt.id, result.score, result.total_points
    );
    Ok(result)
}

/// Joins a quiz by access code, as a logged-in user or as a named guest.
///
/// Request Body: `VerifyCodePayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `QuizJoinResponse`: Attempt token and quiz overview (200 OK).
/// * `403 Forbidden`: If the quiz is inactive.
/// * `404 Not Found`: If no quiz has this code.
/// * `409 Conflict`: If the quiz has no questions.
/// * `422 Unprocessable Entity`: If a guest joins without a name.
#[instrument(skip(pool))]
pub async fn verify_code(
    State(pool): State<Pool>,
    MaybeAuthUser(user): MaybeAuthUser,
    Json(payload): Json<VerifyCodePayload>,
) -> Result<ApiResponse<QuizJoinResponse>, AppError> {
    let code = helper::normalize_access_code(&payload.code);
    info!("Verifying quiz access code {}", code);

    let joined = helper::run_transaction(&pool, move |conn| {
        let quiz = quizzes_dsl::quizzes
            .filter(quizzes_dsl::access_code.eq(&code))
            .select(Quiz::as_select())
            .first::<Quiz>(conn)
            .optional()?
            .ok_or_else(|| {
                warn!("No quiz matches access code {}", code);
                AppError::NotFound(format!("No quiz found for code {}.", code))
            })?;
        let (user_id, guest_name) =
            resolve_participant(user.as_ref(), payload.guest_name.as_deref())?;
        start_quiz_attempt(conn, &quiz, user_id, guest_name, None)
    })
    .await?;

    info!(
        "Attempt {} started on quiz {}",
        joined.attempt_token, joined.quiz_id
    );
    Ok(ApiResponse::ok(joined))
}

/// Starts the quiz or programming problem behind one of the caller's affectations.
///
/// Returns (wrapped in `ApiResponse`)
/// * `JoinResponse`: Quiz or problem join payload, tagged by `kind` (200 OK).
/// * `403 Forbidden`: If the affectation belongs to someone else or the item is inactive.
/// * `404 Not Found`: If the affectation does not exist.
/// * `409 Conflict`: If the affectation is already completed.
///
/// Starting a pending affectation again returns the attempt it already owns.
#[instrument(skip(pool))]
pub async fn start_affectation(
    State(pool): State<Pool>,
    user: AuthUser,
    Path(affectation_id): Path<i64>,
) -> Result<ApiResponse<JoinResponse>, AppError> {
    info!(
        "User {} starting affectation {}",
        user.user_id, affectation_id
    );
    let user_id = user.user_id;

    let joined = helper::run_transaction(&pool, move |conn| {
        let affectation = aff_dsl::affectations
            .find(affectation_id)
            .select(Affectation::as_select())
            .for_update()
            .first::<Affectation>(conn)
            .optional()?
            .ok_or_else(|| {
                AppError::NotFound(format!("Affectation with ID {} not found.", affectation_id))
            })?;

        if affectation.user_id != user_id {
            warn!(
                "User {} tried to start affectation {} of user {}",
                user_id, affectation_id, affectation.user_id
            );
            return Err(AppError::Forbidden(
                "This affectation belongs to another user.".to_string(),
            ));
        }
        if affectation.completed_at.is_some() {
            return Err(AppError::Conflict(format!(
                "Affectation {} is already completed.",
                affectation_id
            )));
        }

        match (affectation.quiz_id, affectation.prog_problem_id) {
            (Some(quiz_id), _) => {
                let quiz = quizzes_dsl::quizzes
                    .find(quiz_id)
                    .select(Quiz::as_select())
                    .first::<Quiz>(conn)?;
                start_quiz_attempt(conn, &quiz, Some(user_id), None, Some(affectation_id))
                    .map(JoinResponse::Quiz)
            }
            (None, Some(problem_id)) => {
                let problem = problems_dsl::prog_problems
                    .find(problem_id)
                    .select(ProgProblem::as_select())
                    .first::<ProgProblem>(conn)?;
                prog::start_prog_attempt(conn, &problem, Some(user_id), None, Some(affectation_id))
                    .map(JoinResponse::ProgProblem)
            }
            (None, None) => Err(AppError::InternalServerError(anyhow::anyhow!(
                "Affectation {} has neither quiz nor problem",
                affectation_id
            ))),
        }
    })
    .await?;

    Ok(ApiResponse::ok(joined))
}

/// Delivers the current question and starts its countdown on first delivery.
///
/// Returns (wrapped in `ApiResponse`)
/// * `CurrentQuestionResponse`: The question without its answer, plus remaining seconds (200 OK).
/// * `404 Not Found`: If the token is unknown.
/// * `409 Conflict`: If the attempt is completed.
#[instrument(skip(pool))]
pub async fn current_question(
    State(pool): State<Pool>,
    Path(token): Path<Uuid>,
) -> Result<ApiResponse<CurrentQuestionResponse>, AppError> {
    let current = helper::run_transaction(&pool, move |conn| {
        let attempt = load_attempt_for_update(conn, token)?;
        ensure_in_progress(&attempt)?;
        let questions = load_quiz_questions(conn, attempt.quiz_id)?;
        let question = current_of(&attempt, &questions)?;

        let now = Utc::now();
        let started_at = match attempt.question_started_at {
            Some(started_at) => started_at,
            None => {
                diesel::update(attempts_dsl::quiz_attempts.find(attempt.id))
                    .set(attempts_dsl::question_started_at.eq(now))
                    .execute(conn)?;
                debug!(
                    "Countdown started for question {} of attempt {}",
                    question.id, attempt.id
                );
                now
            }
        };

        Ok(CurrentQuestionResponse {
            index: attempt.current_index,
            question_count: questions.len() as i32,
            question_id: question.id,
            prompt: question.prompt.clone(),
            options: question.options.clone(),
            points: question.points,
            time_limit_seconds: question.time_limit_seconds,
            remaining_seconds: remaining_seconds(started_at, now, question.time_limit_seconds),
        })
    })
    .await?;

    Ok(ApiResponse::ok(current))
}

/// Grades the answer to the current question and advances the attempt.
///
/// Request Body: `AnswerPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `AnswerOutcomeResponse`: Grade, correct answer, and the result once the last question is answered (200 OK).
/// * `404 Not Found`: If the token is unknown.
/// * `409 Conflict`: If the attempt is completed, the question is not the current one, or it was never delivered.
#[instrument(skip(pool))]
pub async fn answer(
    State(pool): State<Pool>,
    Path(token): Path<Uuid>,
    Json(payload): Json<AnswerPayload>,
) -> Result<ApiResponse<AnswerOutcomeResponse>, AppError> {
    let outcome = helper::run_transaction(&pool, move |conn| {
        let attempt = load_attempt_for_update(conn, token)?;
        ensure_in_progress(&attempt)?;
        let questions = load_quiz_questions(conn, attempt.quiz_id)?;
        let question = current_of(&attempt, &questions)?;

        if payload.question_id != question.id {
            warn!(
                "Attempt {} answered question {} while {} is current",
                attempt.id, payload.question_id, question.id
            );
            return Err(AppError::Conflict(format!(
                "Question {} is not the current question.",
                payload.question_id
            )));
        }
        let started_at = attempt.question_started_at.ok_or_else(|| {
            AppError::Conflict(format!(
                "Question {} has not been delivered yet.",
                question.id
            ))
        })?;

        let now = Utc::now();
        let grade = grade_answer(
            payload.selected.as_deref(),
            &question.correct_answer,
            question.points,
            now - started_at,
            question.time_limit_seconds,
        );

        diesel::insert_into(answers_dsl::attempt_answers)
            .values(&NewAttemptAnswer {
                attempt_id: attempt.id,
                question_id: question.id,
                selected: payload.selected.clone(),
                correct: grade.correct,
                timed_out: grade.timed_out,
                points_awarded: grade.points_awarded,
            })
            .execute(conn)?;

        let next_index = attempt.current_index + 1;
        diesel::update(attempts_dsl::quiz_attempts.find(attempt.id))
            .set((
                attempts_dsl::current_index.eq(next_index),
                attempts_dsl::score.eq(attempt.score + grade.points_awarded),
                attempts_dsl::question_started_at.eq(None::<DateTime<Utc>>),
            ))
            .execute(conn)?;

        let finished = next_index as usize >= questions.len();
        let result = if finished {
            Some(finalize_quiz_attempt(conn, &attempt, &questions, now)?)
        } else {
            None
        };

        Ok(AnswerOutcomeResponse {
            correct: grade.correct,
            timed_out: grade.timed_out,
            points_awarded: grade.points_awarded,
            correct_answer: question.correct_answer.clone(),
            finished,
            result,
        })
    })
    .await?;

    debug!(
        "Answer graded: correct={}, timed_out={}, points={}",
        outcome.correct, outcome.timed_out, outcome.points_awarded
    );
    Ok(ApiResponse::ok(outcome))
}

/// Ends an attempt early. Unanswered questions score nothing.
#[instrument(skip(pool))]
pub async fn finish(
    State(pool): State<Pool>,
    Path(token): Path<Uuid>,
) -> Result<ApiResponse<QuizResultResponse>, AppError> {
    info!("Finishing attempt {} early", token);

    let result = helper::run_transaction(&pool, move |conn| {
        let attempt = load_attempt_for_update(conn, token)?;
        ensure_in_progress(&attempt)?;
        let questions = load_quiz_questions(conn, attempt.quiz_id)?;
        finalize_quiz_attempt(conn, &attempt, &questions, Utc::now())
    })
    .await?;

    Ok(ApiResponse::ok(result))
}

/// Returns the graded result of a completed attempt.
///
/// Returns (wrapped in `ApiResponse`)
/// * `QuizResultResponse`: Totals and a per-question review (200 OK).
/// * `404 Not Found`: If the token is unknown.
/// * `409 Conflict`: If the attempt is still in progress.
#[instrument(skip(pool))]
pub async fn result(
    State(pool): State<Pool>,
    Path(token): Path<Uuid>,
) -> Result<ApiResponse<QuizResultResponse>, AppError> {
    let result = helper::run_transaction(&pool, move |conn| {
        let attempt = attempts_dsl::quiz_attempts
            .filter(attempts_dsl::token.eq(token))
            .select(QuizAttempt::as_select())
            .first::<QuizAttempt>(conn)
            .optional()?
            .ok_or_else(|| AppError::NotFound(format!("Attempt {} not found.", token)))?;
        if !attempt.is_completed() {
            return Err(AppError::Conflict(format!(
                "Attempt {} is still in progress.",
                token
            )));
        }
        let questions = load_quiz_questions(conn, attempt.quiz_id)?;
        let answers = load_answers(conn, attempt.id)?;
        Ok(quiz_result(&questions, &answers))
    })
    .await?;

    Ok(ApiResponse::ok(result))
}
