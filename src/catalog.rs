//! Printable models offered by the shop, and user uploads.

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, UploadFlowError};
use crate::http::HttpClient;
use crate::upload::{self, SelectedFile};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Mesh file, absolute or backend-relative.
    #[serde(alias = "model_url", alias = "url")]
    pub file_url: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    /// Base price before filament and quantity.
    #[serde(default)]
    pub price: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ModelList {
    Paged { items: Vec<ModelSummary> },
    Bare(Vec<ModelSummary>),
}

fn id_string<'de, D: serde::Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid id {other}"))),
    }
}

pub async fn list_models(client: &HttpClient) -> Result<Vec<ModelSummary>, ApiError> {
    let list: ModelList = client.get_json("/models").await?;
    Ok(match list {
        ModelList::Paged { items } | ModelList::Bare(items) => items,
    })
}

/// Case-insensitive match on name and description.
pub fn search<'a>(models: &'a [ModelSummary], query: &str) -> Vec<&'a ModelSummary> {
    let q = query.trim().to_ascii_lowercase();
    models
        .iter()
        .filter(|m| {
            q.is_empty()
                || m.name.to_ascii_lowercase().contains(&q)
                || m.description
                    .as_deref()
                    .is_some_and(|d| d.to_ascii_lowercase().contains(&q))
        })
        .collect()
}

/// Validates the mesh locally, then posts it as multipart `file`.
pub async fn upload_model(
    client: &HttpClient,
    file: SelectedFile,
) -> Result<ModelSummary, UploadFlowError> {
    upload::validate_model(&file)?;
    log::info!("uploading {} ({} bytes)", file.name, file.bytes.len());
    let model = client
        .post_multipart("/models/upload", file.into_multipart("file"))
        .await?;
    Ok(model)
}
