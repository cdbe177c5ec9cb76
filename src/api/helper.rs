use crate::errors::AppError;
use anyhow::anyhow;
use diesel::{Connection, PgConnection};
use tracing::{debug, error, warn};
use uuid::Uuid;

pub(super) use crate::payloads::{EMAIL_MAX_LENGTH, NAME_MAX_LENGTH, TITLE_MAX_LENGTH};

pub const ACCESS_CODE_LENGTH: usize = 8;
const ACCESS_CODE_ATTEMPTS: usize = 10;

pub(super) async fn run_query<T, F>(
    pool: &deadpool_diesel::postgres::Pool,
    query: F,
) -> Result<T, AppError>
where
    F: FnOnce(&mut PgConnection) -> Result<T, diesel::result::Error> + Send + 'static,
    T: Send + 'static,
{
    let conn = pool.get().await.map_err(|pool_err| {
        error!(
            "Failed to get DB connection object from pool: {:?}",
            pool_err
        );
        AppError::from(pool_err)
    })?;
    debug!("DB connection object obtained from pool for interaction");

    let res = conn.interact(query).await;

    match res {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(diesel_err)) => {
            error!("Diesel query failed within interaction: {:?}", diesel_err);
            Err(AppError::from(diesel_err))
        }
        Err(interact_err) => {
            error!("Deadpool interact error: {:?}", interact_err);
            Err(AppError::from(interact_err))
        }
    }
}

/// Runs `work` inside a single database transaction on a pooled connection.
pub(super) async fn run_transaction<T, F>(
    pool: &deadpool_diesel::postgres::Pool,
    work: F,
) -> Result<T, AppError>
where
    F: FnOnce(&mut PgConnection) -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    let conn = pool.get().await?;
    conn.interact(move |conn_sync| conn_sync.transaction(work))
        .await?
}

/// Eight uppercase hex characters taken from a fresh v4 UUID.
pub fn generate_access_code() -> String {
    Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(ACCESS_CODE_LENGTH)
        .collect::<String>()
        .to_uppercase()
}

/// Codes are typed by hand; tolerate surrounding spaces and lowercase input.
pub fn normalize_access_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Runs `write` with freshly drawn codes until `constraint` accepts one.
///
/// Each try runs in a savepoint, so a collision with a concurrent writer
/// leaves the surrounding transaction usable for the next draw.
pub(super) fn with_unique_access_code<T, F>(
    conn: &mut PgConnection,
    constraint: &str,
    mut write: F,
) -> Result<T, AppError>
where
    F: FnMut(&mut PgConnection, &str) -> Result<T, AppError>,
{
    for _ in 0..ACCESS_CODE_ATTEMPTS {
        let code = generate_access_code();
        match conn.transaction(|conn| write(conn, &code)) {
            Err(e) if e.is_unique_violation_of(constraint) => {
                warn!("Generated access code {} collided, drawing another", code);
            }
            other => return other,
        }
    }
    Err(AppError::InternalServerError(anyhow!(
        "Could not generate a unique access code after {} attempts",
        ACCESS_CODE_ATTEMPTS
    )))
}

/// Trimmed, non-empty text of at most `max_chars` characters, or a 422 naming the field.
pub(super) fn required_text(value: &str, field: &str, max_chars: usize) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::UnprocessableEntity(format!(
            "Field '{}' must not be empty.",
            field
        )));
    }
    if trimmed.chars().count() > max_chars {
        return Err(AppError::UnprocessableEntity(format!(
            "Field '{}' must be at most {} characters long.",
            field, max_chars
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_codes_are_uppercase_hex() {
        let code = generate_access_code();
        assert_eq!(code.len(), ACCESS_CODE_LENGTH);
        assert!(
            code.chars()
                .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
        );
    }

    #[test]
    fn access_codes_differ_between_draws() {
        assert_ne!(generate_access_code(), generate_access_code());
    }

    #[test]
    fn typed_codes_are_normalized() {
        assert_eq!(normalize_access_code("  ab12cd34 \n"), "AB12CD34");
    }

    #[test]
    fn required_text_trims_and_rejects_blank() {
        assert_eq!(required_text("  Rust ", "name", 10).unwrap(), "Rust");
        assert!(matches!(
            required_text("   ", "name", 10),
            Err(AppError::UnprocessableEntity(_))
        ));
    }

    #[test]
    fn required_text_enforces_column_width() {
        let exact = "é".repeat(NAME_MAX_LENGTH);
        assert_eq!(required_text(&exact, "name", NAME_MAX_LENGTH).unwrap(), exact);

        let long = "x".repeat(NAME_MAX_LENGTH + 1);
        assert!(matches!(
            required_text(&long, "name", NAME_MAX_LENGTH),
            Err(AppError::UnprocessableEntity(_))
        ));
    }
}
