pub mod auth;
pub mod boards;
pub mod comments;
pub mod engagement;
pub mod error;
pub mod middleware;
pub mod pins;
pub mod routes;
pub mod users;

use anyhow::anyhow;
use tracing::error;

pub use auth::{AppState, AppStateInner};
pub use error::ApiError;
pub use routes::router;

/// Run blocking storage work off the async runtime.
pub(crate) async fn blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::PersistenceFailure(anyhow!("blocking task failed: {}", e))
    })?
}
