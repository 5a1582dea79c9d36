//! Batched delete driver

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use super::backend::{MAX_DELETE_BATCH, ParameterBackend};
use crate::error::Result;
use crate::limiter::CallGate;

/// Deletes `names` in contiguous chunks of at most [`MAX_DELETE_BATCH`].
///
/// All chunks are queued on the gate at once. The call returns after every
/// chunk settled; if any failed, the error of the earliest failing chunk is
/// returned and whatever the other chunks removed stays removed. Returns
/// the number of names the backend reported as deleted.
pub async fn delete_all(
    backend: &Arc<dyn ParameterBackend>,
    gate: &CallGate,
    names: Vec<String>,
) -> Result<usize> {
    let batches: Vec<Vec<String>> = names
        .chunks(MAX_DELETE_BATCH)
        .map(<[String]>::to_vec)
        .collect();
    let total = names.len();

    let calls: Vec<_> = batches
        .into_iter()
        .enumerate()
        .map(|(i, batch)| {
            debug!(
                "Deleting parameters ({}/{})...",
                i * MAX_DELETE_BATCH + 1,
                total
            );
            let backend = backend.clone();
            gate.add(move || async move { backend.delete_parameters(batch).await })
        })
        .collect();

    let mut deleted = 0;
    let mut first_error = None;
    for outcome in join_all(calls).await {
        match outcome {
            Ok(outcome) => {
                if !outcome.invalid.is_empty() {
                    warn!(names = ?outcome.invalid, "Backend reported parameters that did not exist");
                }
                deleted += outcome.deleted.len();
            }
            Err(e) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(deleted),
    }
}
