use crate::auth::JwtKeys;
use crate::cli::Args;
use anyhow::{Context, anyhow};
use axum::Router;
use axum::extract::FromRef;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::routing::{delete, get, post, put};
use deadpool_diesel::Runtime;
use deadpool_diesel::postgres::{Manager, Pool};
use diesel::PgConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod auth;
pub mod cli;
pub mod errors;
pub mod model;
pub mod payloads;
pub mod response;
pub mod schema;
pub mod scoring;

mod api;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Secret the test router signs tokens with.
pub const TEST_JWT_SECRET: &str = "quizforge-test-secret";

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub keys: JwtKeys,
}

impl FromRef<AppState> for Pool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.keys.clone()
    }
}

/// Applies every migration not yet recorded in the database.
pub fn run_migrations(conn: &mut PgConnection) -> anyhow::Result<()> {
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow!("Failed to run migrations: {}", e))?;
    info!("Applied {} pending migrations", applied.len());
    Ok(())
}

pub async fn init_router(args: &Args) -> anyhow::Result<Router> {
    info!("Initializing database pool...");
    let pool = init_pool(&args.connection_str, args.db_pool_max_size)
        .context("Failed to initialize database pool")?;

    if args.run_migrations {
        info!("Running database migrations...");
        let conn = pool
            .get()
            .await
            .context("Failed to get a connection for migrations")?;
        conn.interact(run_migrations)
            .await
            .map_err(|e| anyhow!("Migration task failed: {}", e))??;
    }

    let keys = JwtKeys::new(args.jwt_secret.as_bytes(), args.jwt_ttl_minutes);

    info!("Initializing CORS layer for origin {}...", args.allowed_origin);
    let cors = init_cors_layer(&args.allowed_origin).context("Failed to initialize CORS layer")?;

    info!("Initializing router...");
    Ok(init_router_internal(AppState { pool, keys })
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}

pub fn init_test_router(pool: Pool) -> Router {
    let keys = JwtKeys::new(TEST_JWT_SECRET.as_bytes(), 60);
    init_router_internal(AppState { pool, keys })
}

fn init_router_internal(state: AppState) -> Router {
    let api = Router::new()
        .merge(account_routes())
        .merge(catalog_routes())
        .merge(play_routes())
        .merge(team_routes())
        .merge(history_routes());

    Router::new().nest("/api", api).with_state(state)
}

fn init_pool(conn_str: &str, max_size: u32) -> anyhow::Result<Pool> {
    let manager = Manager::new(conn_str, Runtime::Tokio1);
    let pool = Pool::builder(manager).max_size(max_size as usize).build()?;
    Ok(pool)
}

fn init_cors_layer(allowed_origin: &str) -> anyhow::Result<CorsLayer> {
    let origin: HeaderValue = allowed_origin
        .parse()
        .with_context(|| format!("Invalid allowed origin '{}'", allowed_origin))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]))
}

fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(api::account::register))
        .route("/login", post(api::account::login))
        .route("/me", get(api::account::me))
        .route("/me/password", post(api::account::change_password))
        .route(
            "/admin/users",
            get(api::account::list_users).post(api::account::create_user),
        )
        .route("/admin/users/{id}", delete(api::account::delete_user))
        .route("/admin/users/{id}/role", post(api::account::set_user_role))
}

fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route("/languages", get(api::catalog::list_languages))
        .route("/admin/languages", post(api::catalog::create_language))
        .route(
            "/admin/languages/{id}",
            put(api::catalog::update_language).delete(api::catalog::delete_language),
        )
        .route(
            "/admin/questions",
            get(api::catalog::list_questions).post(api::catalog::create_question),
        )
        .route(
            "/admin/questions/{id}",
            get(api::catalog::get_question)
                .put(api::catalog::update_question)
                .delete(api::catalog::delete_question),
        )
        .route(
            "/admin/quizzes",
            get(api::catalog::list_quizzes).post(api::catalog::create_quiz),
        )
        .route("/admin/quizzes/generate", post(api::catalog::generate_quiz))
        .route(
            "/admin/quizzes/{id}",
            get(api::catalog::get_quiz).delete(api::catalog::delete_quiz),
        )
        .route(
            "/admin/quizzes/{id}/active",
            post(api::catalog::set_quiz_active),
        )
        .route(
            "/admin/quizzes/{id}/code",
            post(api::catalog::regenerate_quiz_code),
        )
        .route(
            "/admin/prog-problems",
            get(api::catalog::list_prog_problems).post(api::catalog::create_prog_problem),
        )
        .route(
            "/admin/prog-problems/{id}",
            get(api::catalog::get_prog_problem).delete(api::catalog::delete_prog_problem),
        )
        .route(
            "/admin/prog-problems/{id}/tasks",
            post(api::catalog::add_task),
        )
        .route(
            "/admin/prog-problems/{id}/active",
            post(api::catalog::set_prog_problem_active),
        )
        .route(
            "/admin/tasks/{id}",
            put(api::catalog::update_task).delete(api::catalog::delete_task),
        )
}

fn play_routes() -> Router<AppState> {
    Router::new()
        .route("/quizzes/verify-code", post(api::attempt::verify_code))
        .route(
            "/affectations/{id}/start",
            post(api::attempt::start_affectation),
        )
        .route(
            "/attempts/{token}/current",
            get(api::attempt::current_question),
        )
        .route("/attempts/{token}/answer", post(api::attempt::answer))
        .route("/attempts/{token}/finish", post(api::attempt::finish))
        .route("/attempts/{token}/result", get(api::attempt::result))
        .route("/prog-actions/verify-code", post(api::prog::verify_code))
        .route("/prog-actions/{token}/tasks", get(api::prog::tasks))
        .route("/prog-actions/{token}/submit", post(api::prog::submit))
        .route("/prog-actions/{token}/finish", post(api::prog::finish))
        .route("/prog-actions/{token}/result", get(api::prog::result))
}

fn team_routes() -> Router<AppState> {
    Router::new()
        .route("/me/teams", get(api::team::my_teams))
        .route("/me/affectations", get(api::team::my_affectations))
        .route("/teams/{id}", get(api::team::get_team))
        .route("/teams/{id}/leaderboard", get(api::team::leaderboard))
        .route(
            "/admin/teams",
            get(api::team::list_teams).post(api::team::create_team),
        )
        .route("/admin/teams/{id}", delete(api::team::delete_team))
        .route("/admin/teams/{id}/members", post(api::team::add_member))
        .route(
            "/admin/teams/{id}/members/{user_id}",
            delete(api::team::remove_member),
        )
        .route(
            "/admin/affectations",
            get(api::team::list_affectations).post(api::team::create_affectation),
        )
        .route(
            "/admin/affectations/{id}",
            delete(api::team::delete_affectation),
        )
}

fn history_routes() -> Router<AppState> {
    Router::new()
        .route("/me/history", get(api::history::my_history))
        .route("/admin/history/quizzes", get(api::history::quiz_history))
        .route(
            "/admin/history/prog-problems",
            get(api::history::prog_history),
        )
        .route("/admin/quizzes/{id}/stats", get(api::history::quiz_stats))
        .route("/admin/dashboard", get(api::history::dashboard))
}
