//! Thin wrapper around task spawning with supervised error logging.

use std::future::Future;

use tokio::task::JoinHandle;

/// Spawns a new asynchronous task
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(future)
}

/// Runs a fallible future on its own task and logs the outcome.
///
/// The failure of the inner future, or a panic inside it, is logged under `name` and never
/// propagated to the caller.
pub async fn supervised<F, E>(name: &'static str, future: F)
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    match spawn(future).await {
        Ok(Ok(())) => tracing::trace!("Background task {} finished", name),
        Ok(Err(err)) => tracing::warn!("Background task {} failed: {}", name, err),
        Err(join_err) => tracing::error!("Background task {} aborted: {}", name, join_err),
    }
}

/// Spawns a [`supervised`] background task
pub fn spawn_supervised<F, E>(name: &'static str, future: F) -> JoinHandle<()>
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    spawn(supervised(name, future))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn supervised_swallows_errors() {
        let handle = spawn_supervised("failing", async { Err::<(), _>("boom") });
        assert!(handle.await.is_ok());
    }

    #[tokio::test]
    async fn supervised_swallows_panics() {
        let handle = spawn_supervised("panicking", async {
            if true {
                panic!("boom");
            }
            Ok::<(), String>(())
        });
        assert!(handle.await.is_ok());
    }
}
