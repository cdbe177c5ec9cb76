use super::helper;
use crate::auth::{AdminUser, AuthUser};
use crate::model::catalog::{
    AccessCodeResponse, Language, NewLanguage, NewProgProblem, NewQuestion, NewQuiz,
    NewQuizQuestion, NewTask, ProgProblem, ProgProblemDetailResponse, ProgProblemSummaryResponse,
    Question, Quiz, QuizDetailResponse, QuizSummaryResponse, Task, TaskChangeset,
};
use crate::payloads::catalog::{
    CreateProgProblemPayload, CreateQuizPayload, GenerateQuizPayload, LanguagePayload,
    ListQuestionsParams, QuestionPayload, SetActivePayload, TaskPayload, validate_difficulty,
};
use crate::{
    errors::AppError,
    response::ApiResponse,
    schema::{
        languages::dsl as languages_dsl, prog_problems::dsl as problems_dsl,
        questions::dsl as questions_dsl, quiz_questions::dsl as qq_dsl,
        quizzes::dsl as quizzes_dsl, tasks::dsl as tasks_dsl,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use deadpool_diesel::postgres::Pool;
use diesel::dsl::{count_star, exists, max, select, sum};
use diesel::prelude::*;
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use tracing::{debug, error, info, instrument, warn};

diesel::define_sql_function!(fn random() -> Double);

fn language_exists(conn: &mut PgConnection, language_id: i64) -> QueryResult<bool> {
    select(exists(languages_dsl::languages.find(language_id))).get_result(conn)
}

fn ensure_language(conn: &mut PgConnection, language_id: i64) -> Result<(), AppError> {
    if language_exists(conn, language_id)? {
        Ok(())
    } else {
        warn!("Referenced language {} does not exist", language_id);
        Err(AppError::NotFound(format!(
            "Language with ID {} not found.",
            language_id
        )))
    }
}

fn not_found(kind: &str, id: i64) -> AppError {
    AppError::NotFound(format!("{} with ID {} not found.", kind, id))
}

/// Questions of a quiz in play order.
pub(super) fn load_quiz_questions(
    conn: &mut PgConnection,
    quiz_id: i64,
) -> QueryResult<Vec<Question>> {
    qq_dsl::quiz_questions
        .inner_join(questions_dsl::questions)
        .filter(qq_dsl::quiz_id.eq(quiz_id))
        .order(qq_dsl::position.asc())
        .select(Question::as_select())
        .load::<Question>(conn)
}

/// Tasks of a programming problem in display order.
pub(super) fn load_tasks(conn: &mut PgConnection, problem_id: i64) -> QueryResult<Vec<Task>> {
    tasks_dsl::tasks
        .filter(tasks_dsl::prog_problem_id.eq(problem_id))
        .order((tasks_dsl::position.asc(), tasks_dsl::id.asc()))
        .select(Task::as_select())
        .load::<Task>(conn)
}

// ---------------------------------------------------------------------------
// Languages
// ---------------------------------------------------------------------------

/// Lists all languages ordered by name. Any authenticated user.
#[instrument(skip(pool))]
pub async fn list_languages(
    State(pool): State<Pool>,
    user: AuthUser,
) -> Result<ApiResponse<Vec<Language>>, AppError> {
    debug!("User {} listing languages", user.user_id);

    let languages = helper::run_query(&pool, |conn| {
        languages_dsl::languages
            .order(languages_dsl::name.asc())
            .select(Language::as_select())
            .load::<Language>(conn)
    })
    .await?;

    Ok(ApiResponse::ok(languages))
}

/// Creates a language.
///
/// Request Body: `LanguagePayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `i64`: The new language ID (200 OK).
/// * `409 Conflict`: If the name is taken.
/// * `422 Unprocessable Entity`: If the name is empty.
#[instrument(skip(pool))]
pub async fn create_language(
    State(pool): State<Pool>,
    AdminUser(admin): AdminUser,
    Json(payload): Json<LanguagePayload>,
) -> Result<ApiResponse<i64>, AppError> {
    info!("Admin {} creating language {}", admin.user_id, payload.name);

    let new_language = NewLanguage {
        name: helper::required_text(&payload.name, "name", helper::NAME_MAX_LENGTH)?,
        description: payload.description.trim().to_string(),
    };
    let name = new_language.name.clone();

    let result = helper::run_query(&pool, move |conn| {
        diesel::insert_into(languages_dsl::languages)
            .values(&new_language)
            .returning(languages_dsl::id)
            .get_result::<i64>(conn)
    })
    .await;

    match result {
        Ok(id) => {
            info!("Created language {} with ID {}", name, id);
            Ok(ApiResponse::ok(id))
        }
        Err(e) if e.is_unique_violation() => Err(AppError::Conflict(format!(
            "Language '{}' already exists.",
            name
        ))),
        Err(e) => Err(e),
    }
}

/// Renames or re-describes a language.
#[instrument(skip(pool))]
pub async fn update_language(
    State(pool): State<Pool>,
    AdminUser(admin): AdminUser,
    Path(language_id): Path<i64>,
    Json(payload): Json<LanguagePayload>,
) -> Result<ApiResponse<bool>, AppError> {
    info!("Admin {} updating language {}", admin.user_id, language_id);

    let changes = NewLanguage {
        name: helper::required_text(&payload.name, "name", helper::NAME_MAX_LENGTH)?,
        description: payload.description.trim().to_string(),
    };
    let name = changes.name.clone();

    let result = helper::run_query(&pool, move |conn| {
        diesel::update(languages_dsl::languages.find(language_id))
            .set(&changes)
            .execute(conn)
    })
    .await;

    match result {
        Ok(0) => Err(not_found("Language", language_id)),
        Ok(_) => Ok(ApiResponse::ok(true)),
        Err(e) if e.is_unique_violation() => Err(AppError::Conflict(format!(
            "Language '{}' already exists.",
            name
        ))),
        Err(e) => Err(e),
    }
}

/// Deletes a language that nothing references any more.
///
/// Returns (wrapped in `ApiResponse`)
/// * `bool`: true (200 OK).
/// * `404 Not Found`: If the language does not exist.
/// * `409 Conflict`: If questions, quizzes or problems still use it.
#[instrument(skip(pool))]
pub async fn delete_language(
    State(pool): State<Pool>,
    AdminUser(admin): AdminUser,
    Path(language_id): Path<i64>,
) -> Result<ApiResponse<bool>, AppError> {
    info!("Admin {} deleting language {}", admin.user_id, language_id);

    let result = helper::run_query(&pool, move |conn| {
        diesel::delete(languages_dsl::languages.find(language_id)).execute(conn)
    })
    .await;

    match result {
        Ok(0) => Err(not_found("Language", language_id)),
        Ok(_) => Ok(ApiResponse::ok(true)),
        Err(e) if e.is_foreign_key_violation() => {
            warn!("Language {} is still referenced", language_id);
            Err(AppError::Conflict(format!(
                "Language {} is still used by questions, quizzes or problems.",
                language_id
            )))
        }
        Err(e) => Err(e),
    }
}

// ---------------------------------------------------------------------------
// Questions
// ---------------------------------------------------------------------------

fn new_question(payload: QuestionPayload) -> Result<NewQuestion, AppError> {
    payload.validate()?;
    Ok(NewQuestion {
        language_id: payload.language_id,
        prompt: payload.prompt.trim().to_string(),
        options: JsonValue::from(payload.options),
        correct_answer: payload.correct_answer,
        points: payload.points,
        time_limit_seconds: payload.time_limit_seconds,
        difficulty: payload.difficulty,
    })
}

/// Lists questions, optionally filtered by language and difficulty.
///
/// Query Parameters:
/// * `language_id`: Optional language filter.
/// * `difficulty`: Optional difficulty filter (`easy`, `medium`, `hard`).
#[instrument(skip(pool))]
pub async fn list_questions(
    State(pool): State<Pool>,
    AdminUser(admin): AdminUser,
    Query(params): Query<ListQuestionsParams>,
) -> Result<ApiResponse<Vec<Question>>, AppError> {
    if let Some(difficulty) = params.difficulty.as_deref() {
        validate_difficulty(difficulty)?;
    }

    let questions = helper::run_query(&pool, move |conn| {
        let mut query = questions_dsl::questions
            .select(Question::as_select())
            .order(questions_dsl::id.asc())
            .into_boxed();
        if let Some(language_id) = params.language_id {
            query = query.filter(questions_dsl::language_id.eq(language_id));
        }
        if let Some(difficulty) = params.difficulty {
            query = query.filter(questions_dsl::difficulty.eq(difficulty));
        }
        query.load::<Question>(conn)
    })
    .await?;

    info!(
        "Admin {} fetched {} questions",
        admin.user_id,
        questions.len()
    );
    Ok(ApiResponse::ok(questions))
}

#[instrument(skip(pool))]
pub async fn get_question(
    State(pool): State<Pool>,
    AdminUser(_admin): AdminUser,
    Path(question_id): Path<i64>,
) -> Result<ApiResponse<Question>, AppError> {
    let question = helper::run_query(&pool, move |conn| {
        questions_dsl::questions
            .find(question_id)
            .select(Question::as_select())
            .first::<Question>(conn)
            .optional()
    })
    .await?;

    question
        .map(ApiResponse::ok)
        .ok_or_else(|| not_found("Question", question_id))
}

/// Creates a multiple-choice question.
///
/// Request Body: `QuestionPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `i64`: The new question ID (200 OK).
/// * `404 Not Found`: If the language does not exist.
/// * `422 Unprocessable Entity`: If options, answer, points, time or difficulty are invalid.
#[instrument(skip(pool))]
pub async fn create_question(
    State(pool): State<Pool>,
    AdminUser(admin): AdminUser,
    Json(payload): Json<QuestionPayload>,
) -> Result<ApiResponse<i64>, AppError> {
    info!(
        "Admin {} creating question for language {}",
        admin.user_id, payload.language_id
    );
    let question = new_question(payload)?;

    let question_id = helper::run_transaction(&pool, move |conn| {
        ensure_language(conn, question.language_id)?;
        let id = diesel::insert_into(questions_dsl::questions)
            .values(&question)
            .returning(questions_dsl::id)
            .get_result::<i64>(conn)?;
        Ok(id)
    })
    .await?;

    info!("Created question {}", question_id);
    Ok(ApiResponse::ok(question_id))
}

/// Replaces every field of a question.
#[instrument(skip(pool))]
pub async fn update_question(
    State(pool): State<Pool>,
    AdminUser(admin): AdminUser,
    Path(question_id): Path<i64>,
    Json(payload): Json<QuestionPayload>,
) -> Result<ApiResponse<bool>, AppError> {
    info!("Admin {} updating question {}", admin.user_id, question_id);
    let changes = new_question(payload)?;

    helper::run_transaction(&pool, move |conn| {
        ensure_language(conn, changes.language_id)?;
        let rows = diesel::update(questions_dsl::questions.find(question_id))
            .set(&changes)
            .execute(conn)?;
        if rows == 0 {
            return Err(not_found("Question", question_id));
        }
        Ok(())
    })
    .await?;

    Ok(ApiResponse::ok(true))
}

/// Deletes a question no quiz or answer refers to.
///
/// Returns (wrapped in `ApiResponse`)
/// * `bool`: true (200 OK).
/// * `404 Not Found`: If the question does not exist.
/// * `409 Conflict`: If a quiz or a recorded answer still uses it.
#[instrument(skip(pool))]
pub async fn delete_question(
    State(pool): State<Pool>,
    AdminUser(admin): AdminUser,
    Path(question_id): Path<i64>,
) -> Result<ApiResponse<bool>, AppError> {
    info!("Admin {} deleting question {}", admin.user_id, question_id);

    let result = helper::run_query(&pool, move |conn| {
        diesel::delete(questions_dsl::questions.find(question_id)).execute(conn)
    })
    .await;

    match result {
        Ok(0) => Err(not_found("Question", question_id)),
        Ok(_) => Ok(ApiResponse::ok(true)),
        Err(e) if e.is_foreign_key_violation() => Err(AppError::Conflict(format!(
            "Question {} is used by a quiz.",
            question_id
        ))),
        Err(e) => Err(e),
    }
}

// ---------------------------------------------------------------------------
// Quizzes
// ---------------------------------------------------------------------------

const QUIZ_CODE_CONSTRAINT: &str = "quizzes_access_code_key";

/// Inserts the quiz row and its ordered question list on an open transaction.
fn insert_quiz(
    conn: &mut PgConnection,
    title: String,
    description: String,
    language_id: i64,
    created_by: i64,
    question_ids: &[i64],
) -> Result<AccessCodeResponse, AppError> {
    let (quiz_id, access_code) =
        helper::with_unique_access_code(conn, QUIZ_CODE_CONSTRAINT, |conn, code| {
            let quiz_id = diesel::insert_into(quizzes_dsl::quizzes)
                .values(&NewQuiz {
                    title: title.clone(),
                    description: description.clone(),
                    language_id,
                    access_code: code.to_string(),
                    active: true,
                    created_by: Some(created_by),
                })
                .returning(quizzes_dsl::id)
                .get_result::<i64>(conn)?;
            Ok((quiz_id, code.to_string()))
        })?;

    let entries: Vec<NewQuizQuestion> = question_ids
        .iter()
        .enumerate()
        .map(|(position, question_id)| NewQuizQuestion {
            quiz_id,
            question_id: *question_id,
            position: position as i32,
        })
        .collect();
    diesel::insert_into(qq_dsl::quiz_questions)
        .values(&entries)
        .execute(conn)?;

    debug!(
        "Inserted quiz {} with {} questions",
        quiz_id,
        question_ids.len()
    );
    Ok(AccessCodeResponse {
        id: quiz_id,
        access_code,
    })
}

/// Creates a quiz from an explicit, ordered list of questions.
///
/// Request Body: `CreateQuizPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `AccessCodeResponse`: Quiz ID and its access code (200 OK).
/// * `404 Not Found`: If the language or one of the questions does not exist.
/// * `422 Unprocessable Entity`: If the list is empty, has duplicates, or mixes languages.
#[instrument(skip(pool))]
pub async fn create_quiz(
    State(pool): State<Pool>,
    AdminUser(admin): AdminUser,
    Json(payload): Json<CreateQuizPayload>,
) -> Result<ApiResponse<AccessCodeResponse>, AppError> {
    info!(
        "Admin {} creating quiz '{}' with {} questions",
        admin.user_id,
        payload.title,
        payload.question_ids.len()
    );
    payload.validate()?;
    let title = helper::required_text(&payload.title, "title", helper::TITLE_MAX_LENGTH)?;
    let admin_id = admin.user_id;

    let created = helper::run_transaction(&pool, move |conn| {
        ensure_language(conn, payload.language_id)?;

        let found: Vec<(i64, i64)> = questions_dsl::questions
            .filter(questions_dsl::id.eq_any(payload.question_ids.clone()))
            .select((questions_dsl::id, questions_dsl::language_id))
            .load(conn)?;

        let found_ids: HashSet<i64> = found.iter().map(|(id, _)| *id).collect();
        if let Some(missing) = payload
            .question_ids
            .iter()
            .find(|id| !found_ids.contains(id))
        {
            return Err(not_found("Question", *missing));
        }
        if let Some((foreign, _)) = found
            .iter()
            .find(|(_, language_id)| *language_id != payload.language_id)
        {
            return Err(AppError::UnprocessableEntity(format!(
                "Question {} does not belong to language {}.",
                foreign, payload.language_id
            )));
        }

        insert_quiz(
            conn,
            title,
            payload.description.trim().to_string(),
            payload.language_id,
            admin_id,
            &payload.question_ids,
        )
    })
    .await?;

    info!(
        "Created quiz {} with access code {}",
        created.id, created.access_code
    );
    Ok(ApiResponse::ok(created))
}

/// Creates a quiz from randomly drawn questions of one language.
///
/// Request Body: `GenerateQuizPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `AccessCodeResponse`: Quiz ID and its access code (200 OK).
/// * `404 Not Found`: If the language does not exist.
/// * `422 Unprocessable Entity`: If fewer matching questions exist than requested.
#[instrument(skip(pool))]
pub async fn generate_quiz(
    State(pool): State<Pool>,
    AdminUser(admin): AdminUser,
    Json(payload): Json<GenerateQuizPayload>,
) -> Result<ApiResponse<AccessCodeResponse>, AppError> {
    info!(
        "Admin {} generating quiz '{}' with {} random questions",
        admin.user_id, payload.title, payload.question_count
    );
    if payload.question_count <= 0 {
        return Err(AppError::UnprocessableEntity(
            "Question count must be positive.".to_string(),
        ));
    }
    if let Some(difficulty) = payload.difficulty.as_deref() {
        validate_difficulty(difficulty)?;
    }
    let title = helper::required_text(&payload.title, "title", helper::TITLE_MAX_LENGTH)?;
    let admin_id = admin.user_id;

    let created = helper::run_transaction(&pool, move |conn| {
        ensure_language(conn, payload.language_id)?;

        let mut query = questions_dsl::questions
            .filter(questions_dsl::language_id.eq(payload.language_id))
            .select(questions_dsl::id)
            .into_boxed();
        if let Some(difficulty) = payload.difficulty.as_deref() {
            query = query.filter(questions_dsl::difficulty.eq(difficulty));
        }
        let picked: Vec<i64> = query
            .order(random())
            .limit(payload.question_count)
            .load(conn)?;

        if (picked.len() as i64) < payload.question_count {
            warn!(
                "Only {} questions available for language {}, {} requested",
                picked.len(),
                payload.language_id,
                payload.question_count
            );
            return Err(AppError::UnprocessableEntity(format!(
                "Only {} matching questions are available, {} requested.",
                picked.len(),
                payload.question_count
            )));
        }

        insert_quiz(
            conn,
            title,
            payload.description.trim().to_string(),
            payload.language_id,
            admin_id,
            &picked,
        )
    })
    .await?;

    info!("Generated quiz {}", created.id);
    Ok(ApiResponse::ok(created))
}

/// Lists quizzes with their question count and total points.
#[instrument(skip(pool))]
pub async fn list_quizzes(
    State(pool): State<Pool>,
    AdminUser(_admin): AdminUser,
) -> Result<ApiResponse<Vec<QuizSummaryResponse>>, AppError> {
    let (quizzes, totals) = helper::run_query(&pool, |conn| {
        let quizzes = quizzes_dsl::quizzes
            .order(quizzes_dsl::id.asc())
            .select(Quiz::as_select())
            .load::<Quiz>(conn)?;
        let totals: Vec<(i64, i64, Option<i64>)> = qq_dsl::quiz_questions
            .inner_join(questions_dsl::questions)
            .group_by(qq_dsl::quiz_id)
            .select((qq_dsl::quiz_id, count_star(), sum(questions_dsl::points)))
            .load(conn)?;
        Ok((quizzes, totals))
    })
    .await?;

    let totals: HashMap<i64, (i64, i64)> = totals
        .into_iter()
        .map(|(quiz_id, count, points)| (quiz_id, (count, points.unwrap_or(0))))
        .collect();

    let summaries = quizzes
        .into_iter()
        .map(|quiz| {
            let (question_count, total_points) = totals.get(&quiz.id).copied().unwrap_or((0, 0));
            QuizSummaryResponse {
                id: quiz.id,
                title: quiz.title,
                language_id: quiz.language_id,
                access_code: quiz.access_code,
                active: quiz.active,
                question_count,
                total_points,
            }
        })
        .collect::<Vec<_>>();

    debug!("Listing {} quizzes", summaries.len());
    Ok(ApiResponse::ok(summaries))
}

/// Returns a quiz with its full, ordered questions (correct answers included).
#[instrument(skip(pool))]
pub async fn get_quiz(
    State(pool): State<Pool>,
    AdminUser(_admin): AdminUser,
    Path(quiz_id): Path<i64>,
) -> Result<ApiResponse<QuizDetailResponse>, AppError> {
    let detail = helper::run_query(&pool, move |conn| {
        let quiz = quizzes_dsl::quizzes
            .find(quiz_id)
            .select(Quiz::as_select())
            .first::<Quiz>(conn)
            .optional()?;
        match quiz {
            Some(quiz) => {
                let questions = load_quiz_questions(conn, quiz_id)?;
                Ok(Some(QuizDetailResponse { quiz, questions }))
            }
            None => Ok(None),
        }
    })
    .await?;

    detail
        .map(ApiResponse::ok)
        .ok_or_else(|| not_found("Quiz", quiz_id))
}

#[instrument(skip(pool))]
pub async fn set_quiz_active(
    State(pool): State<Pool>,
    AdminUser(admin): AdminUser,
    Path(quiz_id): Path<i64>,
    Json(payload): Json<SetActivePayload>,
) -> Result<ApiResponse<bool>, AppError> {
    info!(
        "Admin {} setting quiz {} active={}",
        admin.user_id, quiz_id, payload.active
    );

    let rows = helper::run_query(&pool, move |conn| {
        diesel::update(quizzes_dsl::quizzes.find(quiz_id))
            .set(quizzes_dsl::active.eq(payload.active))
            .execute(conn)
    })
    .await?;

    if rows == 0 {
        error!("Quiz with ID {} not found. Active flag not changed.", quiz_id);
        return Err(not_found("Quiz", quiz_id));
    }
    Ok(ApiResponse::ok(true))
}

/// Replaces a quiz's access code; the old one stops working immediately.
#[instrument(skip(pool))]
pub async fn regenerate_quiz_code(
    State(pool): State<Pool>,
    AdminUser(admin): AdminUser,
    Path(quiz_id): Path<i64>,
) -> Result<ApiResponse<AccessCodeResponse>, AppError> {
    info!(
        "Admin {} regenerating access code of quiz {}",
        admin.user_id, quiz_id
    );

    let access_code = helper::run_transaction(&pool, move |conn| {
        helper::with_unique_access_code(conn, QUIZ_CODE_CONSTRAINT, |conn, code| {
            let rows = diesel::update(quizzes_dsl::quizzes.find(quiz_id))
                .set(quizzes_dsl::access_code.eq(code))
                .execute(conn)?;
            if rows == 0 {
                return Err(not_found("Quiz", quiz_id));
            }
            Ok(code.to_string())
        })
    })
    .await?;

    Ok(ApiResponse::ok(AccessCodeResponse {
        id: quiz_id,
        access_code,
    }))
}

/// Deletes a quiz that has never been attempted.
///
/// Returns (wrapped in `ApiResponse`)
/// * `bool`: true (200 OK).
/// * `404 Not Found`: If the quiz does not exist.
/// * `409 Conflict`: If attempts or history rows reference the quiz.
#[instrument(skip(pool))]
pub async fn delete_quiz(
    State(pool): State<Pool>,
    AdminUser(admin): AdminUser,
    Path(quiz_id): Path<i64>,
) -> Result<ApiResponse<bool>, AppError> {
    info!("Admin {} deleting quiz {}", admin.user_id, quiz_id);

    let result = helper::run_query(&pool, move |conn| {
        diesel::delete(quizzes_dsl::quizzes.find(quiz_id)).execute(conn)
    })
    .await;

    match result {
        Ok(0) => Err(not_found("Quiz", quiz_id)),
        Ok(_) => Ok(ApiResponse::ok(true)),
        Err(e) if e.is_foreign_key_violation() => {
            warn!("Quiz {} has attempts and cannot be deleted", quiz_id);
            Err(AppError::Conflict(format!(
                "Quiz {} has attempts and cannot be deleted.",
                quiz_id
            )))
        }
        Err(e) => Err(e),
    }
}

// ---------------------------------------------------------------------------
// Programming problems
// ---------------------------------------------------------------------------

const PROBLEM_CODE_CONSTRAINT: &str = "prog_problems_access_code_key";

fn new_task(problem_id: i64, position: i32, payload: TaskPayload) -> NewTask {
    NewTask {
        prog_problem_id: problem_id,
        position,
        title: payload.title.trim().to_string(),
        statement: payload.statement,
        model_solution: payload.model_solution,
        points: payload.points,
        time_limit_seconds: payload.time_limit_seconds,
    }
}

/// Creates a programming problem together with its tasks.
///
/// Request Body: `CreateProgProblemPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `AccessCodeResponse`: Problem ID and its access code (200 OK).
/// * `404 Not Found`: If the language does not exist.
/// * `422 Unprocessable Entity`: If there are no tasks or a task is invalid.
#[instrument(skip(pool))]
pub async fn create_prog_problem(
    State(pool): State<Pool>,
    AdminUser(admin): AdminUser,
    Json(payload): Json<CreateProgProblemPayload>,
) -> Result<ApiResponse<AccessCodeResponse>, AppError> {
    info!(
        "Admin {} creating programming problem '{}' with {} tasks",
        admin.user_id,
        payload.title,
        payload.tasks.len()
    );
    payload.validate()?;
    let title = helper::required_text(&payload.title, "title", helper::TITLE_MAX_LENGTH)?;
    let admin_id = admin.user_id;

    let created = helper::run_transaction(&pool, move |conn| {
        ensure_language(conn, payload.language_id)?;
        let description = payload.description.trim().to_string();
        let (problem_id, access_code) =
            helper::with_unique_access_code(conn, PROBLEM_CODE_CONSTRAINT, |conn, code| {
                let problem_id = diesel::insert_into(problems_dsl::prog_problems)
                    .values(&NewProgProblem {
                        title: title.clone(),
                        description: description.clone(),
                        language_id: payload.language_id,
                        access_code: code.to_string(),
                        active: true,
                        created_by: Some(admin_id),
                    })
                    .returning(problems_dsl::id)
                    .get_result::<i64>(conn)?;
                Ok((problem_id, code.to_string()))
            })?;

        let tasks: Vec<NewTask> = payload
            .tasks
            .into_iter()
            .enumerate()
            .map(|(position, task)| new_task(problem_id, position as i32, task))
            .collect();
        diesel::insert_into(tasks_dsl::tasks)
            .values(&tasks)
            .execute(conn)?;

        Ok(AccessCodeResponse {
            id: problem_id,
            access_code,
        })
    })
    .await?;

    info!(
        "Created programming problem {} with access code {}",
        created.id, created.access_code
    );
    Ok(ApiResponse::ok(created))
}

#[instrument(skip(pool))]
pub async fn list_prog_problems(
    State(pool): State<Pool>,
    AdminUser(_admin): AdminUser,
) -> Result<ApiResponse<Vec<ProgProblemSummaryResponse>>, AppError> {
    let (problems, totals) = helper::run_query(&pool, |conn| {
        let problems = problems_dsl::prog_problems
            .order(problems_dsl::id.asc())
            .select(ProgProblem::as_select())
            .load::<ProgProblem>(conn)?;
        let totals: Vec<(i64, i64, Option<i64>)> = tasks_dsl::tasks
            .group_by(tasks_dsl::prog_problem_id)
            .select((
                tasks_dsl::prog_problem_id,
                count_star(),
                sum(tasks_dsl::points),
            ))
            .load(conn)?;
        Ok((problems, totals))
    })
    .await?;

    let totals: HashMap<i64, (i64, i64)> = totals
        .into_iter()
        .map(|(problem_id, count, points)| (problem_id, (count, points.unwrap_or(0))))
        .collect();

    let summaries = problems
        .into_iter()
        .map(|problem| {
            let (task_count, total_points) = totals.get(&problem.id).copied().unwrap_or((0, 0));
            ProgProblemSummaryResponse {
                id: problem.id,
                title: problem.title,
                language_id: problem.language_id,
                access_code: problem.access_code,
                active: problem.active,
                task_count,
                total_points,
            }
        })
        .collect();

    Ok(ApiResponse::ok(summaries))
}

/// Returns a programming problem with its tasks, model solutions included.
#[instrument(skip(pool))]
pub async fn get_prog_problem(
    State(pool): State<Pool>,
    AdminUser(_admin): AdminUser,
    Path(problem_id): Path<i64>,
) -> Result<ApiResponse<ProgProblemDetailResponse>, AppError> {
    let detail = helper::run_query(&pool, move |conn| {
        let problem = problems_dsl::prog_problems
            .find(problem_id)
            .select(ProgProblem::as_select())
            .first::<ProgProblem>(conn)
            .optional()?;
        match problem {
            Some(problem) => {
                let tasks = load_tasks(conn, problem_id)?;
                Ok(Some(ProgProblemDetailResponse { problem, tasks }))
            }
            None => Ok(None),
        }
    })
    .await?;

    detail
        .map(ApiResponse::ok)
        .ok_or_else(|| not_found("Programming problem", problem_id))
}

/// Appends a task after the problem's current last task.
///
/// Request Body: `TaskPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `i64`: The new task ID (200 OK).
/// * `404 Not Found`: If the problem does not exist.
/// * `422 Unprocessable Entity`: If the task is invalid.
#[instrument(skip(pool))]
pub async fn add_task(
    State(pool): State<Pool>,
    AdminUser(admin): AdminUser,
    Path(problem_id): Path<i64>,
    Json(payload): Json<TaskPayload>,
) -> Result<ApiResponse<i64>, AppError> {
    info!(
        "Admin {} adding task to programming problem {}",
        admin.user_id, problem_id
    );
    payload.validate()?;

    let task_id = helper::run_transaction(&pool, move |conn| {
        let problem_exists: bool =
            select(exists(problems_dsl::prog_problems.find(problem_id))).get_result(conn)?;
        if !problem_exists {
            return Err(not_found("Programming problem", problem_id));
        }

        let last_position: Option<i32> = tasks_dsl::tasks
            .filter(tasks_dsl::prog_problem_id.eq(problem_id))
            .select(max(tasks_dsl::position))
            .first(conn)?;
        let position = last_position.map_or(0, |p| p + 1);

        let id = diesel::insert_into(tasks_dsl::tasks)
            .values(&new_task(problem_id, position, payload))
            .returning(tasks_dsl::id)
            .get_result::<i64>(conn)?;
        Ok(id)
    })
    .await?;

    info!("Added task {} to programming problem {}", task_id, problem_id);
    Ok(ApiResponse::ok(task_id))
}

#[instrument(skip(pool))]
pub async fn update_task(
    State(pool): State<Pool>,
    AdminUser(admin): AdminUser,
    Path(task_id): Path<i64>,
    Json(payload): Json<TaskPayload>,
) -> Result<ApiResponse<bool>, AppError> {
    info!("Admin {} updating task {}", admin.user_id, task_id);
    payload.validate()?;

    let changes = TaskChangeset {
        title: payload.title.trim().to_string(),
        statement: payload.statement,
        model_solution: payload.model_solution,
        points: payload.points,
        time_limit_seconds: payload.time_limit_seconds,
    };

    let rows = helper::run_query(&pool, move |conn| {
        diesel::update(tasks_dsl::tasks.find(task_id))
            .set(&changes)
            .execute(conn)
    })
    .await?;

    if rows == 0 {
        return Err(not_found("Task", task_id));
    }
    Ok(ApiResponse::ok(true))
}

/// Deletes a task along with the submissions made for it.
#[instrument(skip(pool))]
pub async fn delete_task(
    State(pool): State<Pool>,
    AdminUser(admin): AdminUser,
    Path(task_id): Path<i64>,
) -> Result<ApiResponse<bool>, AppError> {
    info!("Admin {} deleting task {}", admin.user_id, task_id);

    let rows = helper::run_query(&pool, move |conn| {
        diesel::delete(tasks_dsl::tasks.find(task_id)).execute(conn)
    })
    .await?;

    if rows == 0 {
        return Err(not_found("Task", task_id));
    }
    Ok(ApiResponse::ok(true))
}

#[instrument(skip(pool))]
pub async fn set_prog_problem_active(
    State(pool): State<Pool>,
    AdminUser(admin): AdminUser,
    Path(problem_id): Path<i64>,
    Json(payload): Json<SetActivePayload>,
) -> Result<ApiResponse<bool>, AppError> {
    info!(
        "Admin {} setting programming problem {} active={}",
        admin.user_id, problem_id, payload.active
    );

    let rows = helper::run_query(&pool, move |conn| {
        diesel::update(problems_dsl::prog_problems.find(problem_id))
            .set(problems_dsl::active.eq(payload.active))
            .execute(conn)
    })
    .await?;

    if rows == 0 {
        return Err(not_found("Programming problem", problem_id));
    }
    Ok(ApiResponse::ok(true))
}

/// Deletes a programming problem that has never been attempted.
///
/// Returns (wrapped in `ApiResponse`)
/// * `bool`: true (200 OK).
/// * `404 Not Found`: If the problem does not exist.
/// * `409 Conflict`: If attempts reference the problem.
#[instrument(skip(pool))]
pub async fn delete_prog_problem(
    State(pool): State<Pool>,
    AdminUser(admin): AdminUser,
    Path(problem_id): Path<i64>,
) -> Result<ApiResponse<bool>, AppError> {
    info!(
        "Admin {} deleting programming problem {}",
        admin.user_id, problem_id
    );

    let result = helper::run_query(&pool, move |conn| {
        diesel::delete(problems_dsl::prog_problems.find(problem_id)).execute(conn)
    })
    .await;

    match result {
        Ok(0) => Err(not_found("Programming problem", problem_id)),
        Ok(_) => Ok(ApiResponse::ok(true)),
        Err(e) if e.is_foreign_key_violation() => Err(AppError::Conflict(format!(
            "Programming problem {} has attempts and cannot be deleted.",
            problem_id
        ))),
        Err(e) => Err(e),
    }
}
