//! Paginated fetch driver

use std::sync::Arc;

use tracing::{debug, warn};

use super::backend::{GetParametersByPath, Parameter, ParameterBackend};
use crate::error::{Result, SyncError};
use crate::limiter::CallGate;

/// Options for one [`fetch_all`] run.
#[derive(Clone, Copy, Debug)]
pub struct FetchOptions {
    pub recursive: bool,
    pub with_decryption: bool,
    /// Fail once this many pages were requested without reaching the end.
    pub max_pages: Option<u32>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            with_decryption: true,
            max_pages: None,
        }
    }
}

/// Lists every parameter below `path`, following continuation tokens until
/// the backend stops returning one.
///
/// Any failing page aborts the whole fetch; partial results are discarded.
pub async fn fetch_all(
    backend: &Arc<dyn ParameterBackend>,
    gate: &CallGate,
    path: &str,
    options: FetchOptions,
) -> Result<Vec<Parameter>> {
    let mut parameters = Vec::new();
    let mut next_token: Option<String> = None;
    let mut pages = 0u32;

    loop {
        if let Some(max_pages) = options.max_pages
            && pages >= max_pages
        {
            return Err(SyncError::PageLimitExceeded {
                path: path.to_string(),
                max_pages,
            });
        }
        pages += 1;
        debug!("Requesting parameters for {} ({})...", path, pages);

        let request = GetParametersByPath {
            path: path.to_string(),
            recursive: options.recursive,
            with_decryption: options.with_decryption,
            filters: Vec::new(),
            next_token: next_token.clone(),
        };
        let backend = backend.clone();
        let page = gate
            .add(move || async move { backend.get_parameters_by_path(request).await })
            .await?;

        parameters.extend(page.parameters);
        match page.next_token {
            Some(token) => {
                if next_token.as_deref() == Some(token.as_str()) {
                    warn!(path = %path, token = %token, "Backend returned the same continuation token twice");
                }
                next_token = Some(token);
            }
            None => break,
        }
    }

    debug!(path = %path, pages, count = parameters.len(), "Fetched parameters");
    Ok(parameters)
}
