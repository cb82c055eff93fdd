/*!
 * Utility functions and helpers for buslink.
 */
use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Run a future with a timeout
///
/// # Arguments
///
/// * `duration` - The timeout duration
/// * `future` - The future to run
///
/// # Returns
///
/// The result of the future, or a timeout error if the timeout is reached
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(Error::timeout("Operation timed out")),
    }
}

/// Create a task that runs in the background and logs any errors
///
/// # Arguments
///
/// * `name` - A name for the task (for logging)
/// * `fut` - The future to run
pub fn spawn_and_log<F, T, E>(name: &str, fut: F) -> tokio::task::JoinHandle<()>
where
    F: Future<Output = std::result::Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let task_name = name.to_string();
    tokio::spawn(async move {
        match fut.await {
            Ok(_) => {
                debug!("Task '{}' completed successfully", task_name);
            }
            Err(e) => {
                warn!("Task '{}' failed: {}", task_name, e);
            }
        }
    })
}

/// Turn a human-readable label into an entity-id slug.
///
/// Lowercases, maps every non-alphanumeric run to a single underscore and
/// trims leading/trailing underscores.
pub fn slugify(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    let mut last_was_separator = true;

    for c in label.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_separator = false;
        } else if !last_was_separator {
            slug.push('_');
            last_was_separator = true;
        }
    }

    if slug.ends_with('_') {
        slug.pop();
    }
    slug
}
