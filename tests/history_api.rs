use axum::http::StatusCode;
use bigdecimal::BigDecimal;
use float_cmp::approx_eq;
use quizforge_server::auth::Role;
use quizforge_server::model::history::{
    DashboardResponse, MyHistoryResponse, ProgHistoryEntry, QuizHistoryEntry, QuizStatsResponse,
};
use quizforge_server::model::play::{ProgJoinResponse, QuizJoinResponse};
use quizforge_server::payloads::play::{AnswerPayload, SubmitTaskPayload, VerifyCodePayload};
use quizforge_server::response::ApiResponse;
use uuid::Uuid;

mod helpers;
use helpers::{
    TestServer, TestUser, create_test_language, create_test_prog_problem, create_test_question,
    create_test_quiz, create_test_user, setup_test_environment,
};

async fn join_quiz(server: &TestServer, user: Option<&TestUser>, code: &str) -> Uuid {
    let payload = VerifyCodePayload {
        code: code.to_string(),
        guest_name: Some("Guest Player".to_string()),
    };
    let request = server.post("/api/quizzes/verify-code").json(&payload);
    let request = match user {
        Some(user) => request.authorization_bearer(&user.token),
        None => request,
    };
    let response = request.await;
    assert_eq!(response.status_code(), StatusCode::OK);
    response
        .json::<ApiResponse<QuizJoinResponse>>()
        .data
        .unwrap()
        .attempt_token
}

async fn answer_current(server: &TestServer, token: Uuid, question_id: i64, selected: &str) {
    let response = server
        .get(&format!("/api/attempts/{}/current", token))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let response = server
        .post(&format!("/api/attempts/{}/answer", token))
        .json(&AnswerPayload {
            question_id,
            selected: Some(selected.to_string()),
        })
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

// my_history

#[tokio::test]
async fn test_my_history_lists_quiz_and_problem_results() {
    let (server, pool) = setup_test_environment().await;
    let user = create_test_user(&pool, Role::User).await;
    let language_id = create_test_language(&pool).await;
    let q1 = create_test_question(&pool, language_id, 4, 30, "easy").await;
    let quiz = create_test_quiz(&pool, language_id, vec![q1], true).await;
    let problem = create_test_prog_problem(&pool, language_id, vec![("x = 1", 10, 60)]).await;

    let token = join_quiz(&server, Some(&user), &quiz.access_code).await;
    answer_current(&server, token, q1, "a").await;

    let joined = server
        .post("/api/prog-actions/verify-code")
        .authorization_bearer(&user.token)
        .json(&VerifyCodePayload {
            code: problem.access_code.clone(),
            guest_name: None,
        })
        .await
        .json::<ApiResponse<ProgJoinResponse>>()
        .data
        .unwrap();
    server
        .post(&format!("/api/prog-actions/{}/submit", joined.attempt_token))
        .json(&SubmitTaskPayload {
            task_id: problem.task_ids[0],
            code: "x = 1".to_string(),
        })
        .await;
    let response = server
        .post(&format!("/api/prog-actions/{}/finish", joined.attempt_token))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let response = server
        .get("/api/me/history")
        .authorization_bearer(&user.token)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let history = response.json::<ApiResponse<MyHistoryResponse>>().data.unwrap();

    assert_eq!(history.quizzes.len(), 1);
    let quiz_entry = &history.quizzes[0];
    assert_eq!(quiz_entry.quiz_id, quiz.id);
    assert_eq!(quiz_entry.user_id, Some(user.id));
    assert_eq!(quiz_entry.participant_name, user.username);
    assert_eq!(quiz_entry.score, 4);
    assert_eq!(quiz_entry.percentage, BigDecimal::from(100));

    assert_eq!(history.prog_problems.len(), 1);
    let prog_entry = &history.prog_problems[0];
    assert_eq!(prog_entry.prog_problem_id, problem.id);
    assert_eq!(prog_entry.score, 10);
    assert_eq!(prog_entry.solved_tasks, 1);
}

#[tokio::test]
async fn test_my_history_requires_token() {
    let (server, _pool) = setup_test_environment().await;

    let response = server.get("/api/me/history").await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

// admin history

#[tokio::test]
async fn test_quiz_history_filters_by_quiz_and_user() {
    let (server, pool) = setup_test_environment().await;
    let admin = create_test_user(&pool, Role::Admin).await;
    let player = create_test_user(&pool, Role::User).await;
    let language_id = create_test_language(&pool).await;
    let q1 = create_test_question(&pool, language_id, 4, 30, "easy").await;
    let quiz = create_test_quiz(&pool, language_id, vec![q1], true).await;

    let token = join_quiz(&server, Some(&player), &quiz.access_code).await;
    answer_current(&server, token, q1, "a").await;
    let token = join_quiz(&server, None, &quiz.access_code).await;
    answer_current(&server, token, q1, "b").await;

    let response = server
        .get(&format!("/api/admin/history/quizzes?quiz_id={}", quiz.id))
        .authorization_bearer(&admin.token)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let entries = response
        .json::<ApiResponse<Vec<QuizHistoryEntry>>>()
        .data
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert!(
        entries
            .iter()
            .any(|e| e.user_id.is_none() && e.participant_name == "Guest Player")
    );
    assert!(entries.iter().all(|e| e.quiz_title.starts_with("Quiz")));

    let entries = server
        .get(&format!(
            "/api/admin/history/quizzes?quiz_id={}&user_id={}",
            quiz.id, player.id
        ))
        .authorization_bearer(&admin.token)
        .await
        .json::<ApiResponse<Vec<QuizHistoryEntry>>>()
        .data
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].score, 4);

    let response = server
        .get("/api/admin/history/quizzes")
        .authorization_bearer(&player.token)
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_prog_history_filters_by_problem() {
    let (server, pool) = setup_test_environment().await;
    let admin = create_test_user(&pool, Role::Admin).await;
    let language_id = create_test_language(&pool).await;
    let problem = create_test_prog_problem(&pool, language_id, vec![("x = 1", 10, 60)]).await;

    let joined = server
        .post("/api/prog-actions/verify-code")
        .json(&VerifyCodePayload {
            code: problem.access_code.clone(),
            guest_name: Some("Guest Player".to_string()),
        })
        .await
        .json::<ApiResponse<ProgJoinResponse>>()
        .data
        .unwrap();
    server
        .post(&format!("/api/prog-actions/{}/finish", joined.attempt_token))
        .await;

    let entries = server
        .get(&format!(
            "/api/admin/history/prog-problems?prog_problem_id={}",
            problem.id
        ))
        .authorization_bearer(&admin.token)
        .await
        .json::<ApiResponse<Vec<ProgHistoryEntry>>>()
        .data
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].score, 0);
    assert_eq!(entries[0].percentage, BigDecimal::from(0));
    assert_eq!(entries[0].participant_name, "Guest Player");
}

// quiz_stats

#[tokio::test]
async fn test_quiz_stats_aggregates_attempts() {
    let (server, pool) = setup_test_environment().await;
    let admin = create_test_user(&pool, Role::Admin).await;
    let language_id = create_test_language(&pool).await;
    let q1 = create_test_question(&pool, language_id, 5, 30, "easy").await;
    let q2 = create_test_question(&pool, language_id, 5, 30, "easy").await;
    let quiz = create_test_quiz(&pool, language_id, vec![q1, q2], true).await;

    // 100%
    let token = join_quiz(&server, None, &quiz.access_code).await;
    answer_current(&server, token, q1, "a").await;
    answer_current(&server, token, q2, "a").await;
    // 50%
    let token = join_quiz(&server, None, &quiz.access_code).await;
    answer_current(&server, token, q1, "a").await;
    answer_current(&server, token, q2, "c").await;
    // still running
    join_quiz(&server, None, &quiz.access_code).await;

    let response = server
        .get(&format!("/api/admin/quizzes/{}/stats", quiz.id))
        .authorization_bearer(&admin.token)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let stats = response.json::<ApiResponse<QuizStatsResponse>>().data.unwrap();

    assert_eq!(stats.attempts, 3);
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.average_percentage, Some(BigDecimal::from(75)));
    assert_eq!(stats.best_percentage, Some(BigDecimal::from(100)));
    assert_eq!(stats.questions.len(), 2);
    assert_eq!(stats.questions[0].question_id, q1);
    assert_eq!(stats.questions[0].answered, 2);
    assert!(approx_eq!(f64, stats.questions[0].correct_rate, 1.0));
    assert_eq!(stats.questions[1].correct, 1);
    assert!(approx_eq!(f64, stats.questions[1].correct_rate, 0.5));
}

#[tokio::test]
async fn test_quiz_stats_unknown_quiz() {
    let (server, pool) = setup_test_environment().await;
    let admin = create_test_user(&pool, Role::Admin).await;

    let response = server
        .get(&format!("/api/admin/quizzes/{}/stats", i64::MAX))
        .authorization_bearer(&admin.token)
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

// dashboard

#[tokio::test]
async fn test_dashboard_counts_platform_content() {
    let (server, pool) = setup_test_environment().await;
    let admin = create_test_user(&pool, Role::Admin).await;
    let language_id = create_test_language(&pool).await;
    let q1 = create_test_question(&pool, language_id, 5, 30, "easy").await;
    create_test_quiz(&pool, language_id, vec![q1], true).await;
    create_test_prog_problem(&pool, language_id, vec![("x = 1", 10, 60)]).await;

    let response = server
        .get("/api/admin/dashboard")
        .authorization_bearer(&admin.token)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let counts = response.json::<ApiResponse<DashboardResponse>>().data.unwrap();

    // Other tests share the database, so only lower bounds hold.
    assert!(counts.users >= 1);
    assert!(counts.languages >= 1);
    assert!(counts.questions >= 1);
    assert!(counts.quizzes >= 1);
    assert!(counts.prog_problems >= 1);
}
