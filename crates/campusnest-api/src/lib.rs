pub mod auth;
mod convert;
pub mod error;
pub mod favorites;
pub mod live;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod properties;
pub mod ratings;
pub mod rentals;
pub mod reports;
pub mod routes;
pub mod state;
pub mod users;

use std::sync::Arc;

use campusnest_db::Database;
use tracing::error;

pub use error::ApiError;
pub use routes::router;
pub use state::{AppState, AppStateInner};

/// Run blocking DB work off the async runtime.
pub(crate) async fn blocking<F, T>(db: &Arc<Database>, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Storage(anyhow::anyhow!("blocking task failed: {}", e))
        })?
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use campusnest_db::models::NewUser;
    use campusnest_gateway::ConnectionRegistry;
    use uuid::Uuid;

    pub const SECRET: &str = "test-secret-with-enough-entropy";

    pub fn state() -> AppState {
        AppStateInner::new(
            Database::open_in_memory().unwrap(),
            SECRET.into(),
            chrono::Duration::minutes(30),
            ConnectionRegistry::new(),
        )
    }

    pub fn user(state: &AppState, name: &str, kind: &str) -> Uuid {
        let id = Uuid::new_v4();
        state
            .db
            .create_user(&NewUser {
                id: id.to_string(),
                email: format!("{}@campus.mx", name.to_lowercase()),
                password_hash: "x".into(),
                kind: kind.into(),
                full_name: name.into(),
                phone: None,
            })
            .unwrap();
        id
    }
}
