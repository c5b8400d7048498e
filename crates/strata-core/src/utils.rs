//! Utility functions

use std::future::Future;
use tokio_util::sync::CancellationToken;

use crate::prelude::*;

/// Run `fut` unless `cancel` fires first.
/// Dropping the future on cancellation is the only side effect.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> StResult<T>
where
	F: Future<Output = StResult<T>>,
{
	tokio::select! {
		biased;
		() = cancel.cancelled() => Err(Error::Cancelled),
		res = fut => res,
	}
}


// vim: ts=4
