//! Cancellation plumbing shared by every engine operation.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::EngineError;

/// Run `fut` unless `cancel` fires first.
///
/// Checks the token before polling, so an already-cancelled token never
/// starts the work.
pub async fn cancellable<T, E, F>(cancel: &CancellationToken, fut: F) -> Result<T, EngineError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<EngineError>,
{
    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(EngineError::Cancelled),
        res = fut => res.map_err(Into::into),
    }
}
