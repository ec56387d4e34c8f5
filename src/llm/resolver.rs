// src/llm/resolver.rs

use crate::error::ResolutionError;
use crate::llm::gemini::{GeminiClient, GeminiModelInfo};
use tracing::{info, instrument, warn};

/// Picks a model from the catalog: the first preferred family present, else the first capable entry.
/// Within a family an exact id beats variants such as `-lite` or `-preview-*`.
pub fn select_model(catalog: &[GeminiModelInfo], preferred: &[String]) -> Result<String, ResolutionError> {
    let capable: Vec<&str> = catalog
        .iter()
        .filter(|m| m.supports_generation())
        .map(|m| m.id())
        .collect();

    preferred
        .iter()
        .find_map(|family| {
            capable
                .iter()
                .find(|id| **id == family.as_str())
                .or_else(|| capable.iter().find(|id| id.contains(family.as_str())))
        })
        .or_else(|| capable.first())
        .map(|id| id.to_string())
        .ok_or(ResolutionError::EmptyCatalog)
}

#[instrument(skip(client, api_key, preferred))]
pub async fn resolve(
    client: &GeminiClient,
    api_key: &str,
    preferred: &[String],
) -> Result<String, ResolutionError> {
    let catalog = client.list_models(api_key).await?;
    select_model(&catalog, preferred)
}

/// Like [`resolve`], but any failure yields `fallback`. Startup never fails on resolution.
pub async fn resolve_or_fallback(
    client: &GeminiClient,
    api_key: &str,
    preferred: &[String],
    fallback: &str,
) -> String {
    match resolve(client, api_key, preferred).await {
        Ok(model) => {
            info!(%model, "Resolved model from catalog");
            model
        }
        Err(e) => {
            warn!(error = %e, %fallback, "Model resolution failed, using fallback");
            fallback.to_string()
        }
    }
}
