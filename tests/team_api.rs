use axum::http::StatusCode;
use chrono::{Duration, Utc};
use quizforge_server::auth::Role;
use quizforge_server::model::play::QuizJoinResponse;
use quizforge_server::model::team::{
    Affectation, LeaderboardEntry, MyAffectationResponse, TeamDetailResponse,
    TeamSummaryResponse,
};
use quizforge_server::payloads::play::{AnswerPayload, VerifyCodePayload};
use quizforge_server::payloads::team::{
    AddMemberPayload, CreateAffectationPayload, TeamPayload,
};
use quizforge_server::response::ApiResponse;
use serde_json::Value;

mod helpers;
use helpers::{
    TestServer, TestUser, add_user_to_team, create_test_affectation, create_test_language,
    create_test_prog_problem, create_test_question, create_test_quiz, create_test_team,
    create_test_user, setup_test_environment, unique,
};

/// Plays a one-question quiz as `user`, answering `selected`.
async fn play_quiz(server: &TestServer, user: &TestUser, code: &str, selected: &str) {
    let joined = server
        .post("/api/quizzes/verify-code")
        .authorization_bearer(&user.token)
        .json(&VerifyCodePayload {
            code: code.to_string(),
            guest_name: None,
        })
        .await
        .json::<ApiResponse<QuizJoinResponse>>()
        .data
        .unwrap();
    let token = joined.attempt_token;

    let current: Value = server
        .get(&format!("/api/attempts/{}/current", token))
        .await
        .json();
    let question_id = current["data"]["question_id"].as_i64().unwrap();

    let response = server
        .post(&format!("/api/attempts/{}/answer", token))
        .json(&AnswerPayload {
            question_id,
            selected: Some(selected.to_string()),
        })
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

// teams

#[tokio::test]
async fn test_team_lifecycle() {
    let (server, pool) = setup_test_environment().await;
    let admin = create_test_user(&pool, Role::Admin).await;
    let member = create_test_user(&pool, Role::User).await;

    let name = unique("Blue");
    let response = server
        .post("/api/admin/teams")
        .authorization_bearer(&admin.token)
        .json(&TeamPayload {
            name: name.clone(),
            description: "Morning group".to_string(),
        })
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let team_id = response.json::<ApiResponse<i64>>().data.unwrap();

    let response = server
        .post("/api/admin/teams")
        .authorization_bearer(&admin.token)
        .json(&TeamPayload {
            name: name.clone(),
            description: String::new(),
        })
        .await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);

    let response = server
        .post(&format!("/api/admin/teams/{}/members", team_id))
        .authorization_bearer(&admin.token)
        .json(&AddMemberPayload { user_id: member.id })
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let response = server
        .post(&format!("/api/admin/teams/{}/members", team_id))
        .authorization_bearer(&admin.token)
        .json(&AddMemberPayload { user_id: member.id })
        .await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);

    let response = server
        .get(&format!("/api/teams/{}", team_id))
        .authorization_bearer(&member.token)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let detail = response.json::<ApiResponse<TeamDetailResponse>>().data.unwrap();
    assert_eq!(detail.name, name);
    assert_eq!(detail.members.len(), 1);
    assert_eq!(detail.members[0].user_id, member.id);

    let mine = server
        .get("/api/me/teams")
        .authorization_bearer(&member.token)
        .await
        .json::<ApiResponse<Vec<TeamSummaryResponse>>>()
        .data
        .unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, team_id);
    assert_eq!(mine[0].member_count, 1);

    let response = server
        .delete(&format!("/api/admin/teams/{}/members/{}", team_id, member.id))
        .authorization_bearer(&admin.token)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let response = server
        .delete(&format!("/api/admin/teams/{}/members/{}", team_id, member.id))
        .authorization_bearer(&admin.token)
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let response = server
        .delete(&format!("/api/admin/teams/{}", team_id))
        .authorization_bearer(&admin.token)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let response = server
        .get(&format!("/api/teams/{}", team_id))
        .authorization_bearer(&admin.token)
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_team_hidden_from_non_members() {
    let (server, pool) = setup_test_environment().await;
    let outsider = create_test_user(&pool, Role::User).await;
    let team_id = create_test_team(&pool).await;

    let response = server
        .get(&format!("/api/teams/{}", team_id))
        .authorization_bearer(&outsider.token)
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);

    let response = server
        .get(&format!("/api/teams/{}/leaderboard", team_id))
        .authorization_bearer(&outsider.token)
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_add_unknown_user_to_team_not_found() {
    let (server, pool) = setup_test_environment().await;
    let admin = create_test_user(&pool, Role::Admin).await;
    let team_id = create_test_team(&pool).await;

    let response = server
        .post(&format!("/api/admin/teams/{}/members", team_id))
        .authorization_bearer(&admin.token)
        .json(&AddMemberPayload { user_id: i64::MAX })
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let response = server
        .post(&format!("/api/admin/teams/{}/members", i64::MAX))
        .authorization_bearer(&admin.token)
        .json(&AddMemberPayload { user_id: admin.id })
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

// leaderboard

#[tokio::test]
async fn test_leaderboard_ranks_members_by_total_score() {
    let (server, pool) = setup_test_environment().await;
    let alice = create_test_user(&pool, Role::User).await;
    let bob = create_test_user(&pool, Role::User).await;
    let carol = create_test_user(&pool, Role::User).await;
    let team_id = create_test_team(&pool).await;
    for user in [&alice, &bob, &carol] {
        add_user_to_team(&pool, team_id, user.id).await;
    }

    let language_id = create_test_language(&pool).await;
    let q1 = create_test_question(&pool, language_id, 5, 30, "easy").await;
    let q2 = create_test_question(&pool, language_id, 8, 30, "easy").await;
    let small = create_test_quiz(&pool, language_id, vec![q1], true).await;
    let big = create_test_quiz(&pool, language_id, vec![q2], true).await;

    play_quiz(&server, &alice, &small.access_code, "a").await;
    play_quiz(&server, &alice, &small.access_code, "a").await;
    play_quiz(&server, &bob, &big.access_code, "a").await;
    play_quiz(&server, &carol, &big.access_code, "c").await;

    let response = server
        .get(&format!("/api/teams/{}/leaderboard", team_id))
        .authorization_bearer(&bob.token)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let board = response
        .json::<ApiResponse<Vec<LeaderboardEntry>>>()
        .data
        .unwrap();

    assert_eq!(board.len(), 3);
    assert_eq!(board[0].user_id, alice.id);
    assert_eq!(board[0].total_score, 10);
    assert_eq!(board[0].attempts, 2);
    assert_eq!(board[1].user_id, bob.id);
    assert_eq!(board[1].total_score, 8);
    assert_eq!(board[2].user_id, carol.id);
    assert_eq!(board[2].total_score, 0);
    assert_eq!(board[2].attempts, 1);
    let ranks: Vec<i32> = board.iter().map(|e| e.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3]);
}

// affectations

#[tokio::test]
async fn test_assign_quiz_to_team_skips_pending_duplicates() {
    let (server, pool) = setup_test_environment().await;
    let admin = create_test_user(&pool, Role::Admin).await;
    let first = create_test_user(&pool, Role::User).await;
    let second = create_test_user(&pool, Role::User).await;
    let team_id = create_test_team(&pool).await;
    add_user_to_team(&pool, team_id, first.id).await;
    add_user_to_team(&pool, team_id, second.id).await;

    let language_id = create_test_language(&pool).await;
    let q1 = create_test_question(&pool, language_id, 5, 30, "easy").await;
    let quiz = create_test_quiz(&pool, language_id, vec![q1], true).await;
    create_test_affectation(&pool, first.id, Some(quiz.id), None, None).await;

    let due_at = Utc::now() + Duration::days(2);
    let response = server
        .post("/api/admin/affectations")
        .authorization_bearer(&admin.token)
        .json(&CreateAffectationPayload {
            team_id: Some(team_id),
            quiz_id: Some(quiz.id),
            due_at: Some(due_at),
            ..Default::default()
        })
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let created = response.json::<ApiResponse<Vec<i64>>>().data.unwrap();
    assert_eq!(created.len(), 1);

    let listed = server
        .get(&format!("/api/admin/affectations?quiz_id={}", quiz.id))
        .authorization_bearer(&admin.token)
        .await
        .json::<ApiResponse<Vec<Affectation>>>()
        .data
        .unwrap();
    assert_eq!(listed.len(), 2);
    let for_second = listed.iter().find(|a| a.id == created[0]).unwrap();
    assert_eq!(for_second.user_id, second.id);
    assert_eq!(for_second.team_id, Some(team_id));
    assert!(for_second.due_at.is_some());
}

#[tokio::test]
async fn test_assignment_validation() {
    let (server, pool) = setup_test_environment().await;
    let admin = create_test_user(&pool, Role::Admin).await;
    let user = create_test_user(&pool, Role::User).await;
    let empty_team = create_test_team(&pool).await;
    let language_id = create_test_language(&pool).await;
    let problem = create_test_prog_problem(&pool, language_id, vec![("x = 1", 5, 60)]).await;

    let response = server
        .post("/api/admin/affectations")
        .authorization_bearer(&admin.token)
        .json(&CreateAffectationPayload {
            user_id: Some(user.id),
            ..Default::default()
        })
        .await;
    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = server
        .post("/api/admin/affectations")
        .authorization_bearer(&admin.token)
        .json(&CreateAffectationPayload {
            team_id: Some(empty_team),
            prog_problem_id: Some(problem.id),
            ..Default::default()
        })
        .await;
    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = server
        .post("/api/admin/affectations")
        .authorization_bearer(&admin.token)
        .json(&CreateAffectationPayload {
            user_id: Some(user.id),
            quiz_id: Some(i64::MAX),
            ..Default::default()
        })
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let response = server
        .post("/api/admin/affectations")
        .authorization_bearer(&admin.token)
        .json(&CreateAffectationPayload {
            user_id: Some(i64::MAX),
            prog_problem_id: Some(problem.id),
            ..Default::default()
        })
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_my_affectations_flags_overdue_and_delete() {
    let (server, pool) = setup_test_environment().await;
    let admin = create_test_user(&pool, Role::Admin).await;
    let user = create_test_user(&pool, Role::User).await;
    let language_id = create_test_language(&pool).await;
    let q1 = create_test_question(&pool, language_id, 5, 30, "easy").await;
    let quiz = create_test_quiz(&pool, language_id, vec![q1], true).await;
    let problem = create_test_prog_problem(&pool, language_id, vec![("x = 1", 5, 60)]).await;

    let overdue = create_test_affectation(
        &pool,
        user.id,
        Some(quiz.id),
        None,
        Some(Utc::now() - Duration::hours(1)),
    )
    .await;
    let open = create_test_affectation(&pool, user.id, None, Some(problem.id), None).await;

    let response = server
        .get("/api/me/affectations")
        .authorization_bearer(&user.token)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let mine = response
        .json::<ApiResponse<Vec<MyAffectationResponse>>>()
        .data
        .unwrap();
    assert_eq!(mine.len(), 2);
    let overdue_entry = mine.iter().find(|a| a.id == overdue).unwrap();
    assert!(overdue_entry.overdue);
    assert!(!overdue_entry.completed);
    assert!(overdue_entry.title.starts_with("Quiz"));
    let open_entry = mine.iter().find(|a| a.id == open).unwrap();
    assert!(!open_entry.overdue);
    assert!(open_entry.title.starts_with("Problem"));

    let response = server
        .delete(&format!("/api/admin/affectations/{}", open))
        .authorization_bearer(&admin.token)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let response = server
        .delete(&format!("/api/admin/affectations/{}", open))
        .authorization_bearer(&admin.token)
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let remaining = server
        .get("/api/me/affectations")
        .authorization_bearer(&user.token)
        .await
        .json::<ApiResponse<Vec<MyAffectationResponse>>>()
        .data
        .unwrap();
    assert_eq!(remaining.len(), 1);
}

#[tokio::test]
async fn test_create_team_rejects_overlong_name() {
    let (server, pool) = setup_test_environment().await;
    let admin = create_test_user(&pool, Role::Admin).await;

    let response = server
        .post("/api/admin/teams")
        .authorization_bearer(&admin.token)
        .json(&TeamPayload {
            name: "t".repeat(101),
            description: String::new(),
        })
        .await;

    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
}
