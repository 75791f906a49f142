use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracker_logging::tracker_info;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("invalid backend url: {0}")]
    InvalidUrl(String),
    #[error("generation request failed with http status {status}: {body}")]
    Http { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("backend rejected generation: {0}")]
    Rejected(String),
    #[error("response did not name a job")]
    MissingJobId,
    #[error("invalid source image: {0}")]
    InvalidImage(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationKind {
    Image,
    Video,
}

impl GenerationKind {
    fn path(self) -> &'static str {
        match self {
            GenerationKind::Image => "api/generate/image",
            GenerationKind::Video => "api/generate/video",
        }
    }

    fn mode(self, image_input: bool) -> &'static str {
        match (self, image_input) {
            (GenerationKind::Image, false) => "text-to-image",
            (GenerationKind::Image, true) => "image-to-image",
            (GenerationKind::Video, false) => "text-to-video",
            (GenerationKind::Video, true) => "image-to-video",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub kind: GenerationKind,
    pub prompt: String,
    pub model: Option<String>,
    pub style: Option<String>,
    pub resolution: Option<String>,
    /// Present for image-to-X generations; switches the body to multipart.
    pub source_image: Option<SourceImage>,
}

impl GenerationRequest {
    pub fn text(kind: GenerationKind, prompt: impl Into<String>) -> Self {
        Self {
            kind,
            prompt: prompt.into(),
            model: None,
            style: None,
            resolution: None,
            source_image: None,
        }
    }
}

/// Ids the backend assigned to an accepted generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedJob {
    pub kind: GenerationKind,
    pub prompt: String,
    pub file_id: String,
    pub project_id: Option<String>,
    pub request_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    file_id: Option<String>,
    project_id: Option<String>,
    request_id: Option<String>,
    #[serde(default)]
    files: Vec<SubmitFile>,
    error: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct SubmitFile {
    id: Option<String>,
}

/// Posts generation requests to the backend proxy routes.
#[derive(Debug, Clone)]
pub struct GenerationClient {
    client: reqwest::Client,
    base_url: Url,
}

impl GenerationClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, SubmitError> {
        let base_url =
            Url::parse(base_url).map_err(|err| SubmitError::InvalidUrl(err.to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|err| SubmitError::Network(err.to_string()))?;
        Ok(Self { client, base_url })
    }

    pub async fn submit(&self, request: &GenerationRequest) -> Result<SubmittedJob, SubmitError> {
        let url = self
            .base_url
            .join(request.kind.path())
            .map_err(|err| SubmitError::InvalidUrl(err.to_string()))?;
        let mode = request.kind.mode(request.source_image.is_some());

        let builder = match &request.source_image {
            None => self.client.post(url).json(&serde_json::json!({
                "prompt": request.prompt,
                "generationType": mode,
                "model": request.model,
                "style": request.style,
                "resolution": request.resolution,
            })),
            Some(image) => {
                let part = Part::bytes(image.bytes.clone())
                    .file_name(image.file_name.clone())
                    .mime_str(&image.mime)
                    .map_err(|err| SubmitError::InvalidImage(err.to_string()))?;
                let mut form = Form::new()
                    .text("prompt", request.prompt.clone())
                    .text("generationType", mode)
                    .part("file", part);
                for (name, value) in [
                    ("model", &request.model),
                    ("style", &request.style),
                    ("resolution", &request.resolution),
                ] {
                    if let Some(value) = value {
                        form = form.text(name, value.clone());
                    }
                }
                self.client.post(url).multipart(form)
            }
        };

        let response = builder
            .send()
            .await
            .map_err(|err| SubmitError::Network(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SubmitError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|err| SubmitError::Network(err.to_string()))?;
        if let Some(error) = body.error.filter(|e| !e.is_null()) {
            let message = error
                .as_str()
                .map(ToString::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(SubmitError::Rejected(message));
        }

        let file_id = body
            .file_id
            .or_else(|| body.files.into_iter().find_map(|file| file.id))
            .or_else(|| body.project_id.clone())
            .ok_or(SubmitError::MissingJobId)?;
        tracker_info!("{} accepted as {}", mode, file_id);

        Ok(SubmittedJob {
            kind: request.kind,
            prompt: request.prompt.clone(),
            file_id,
            project_id: body.project_id,
            request_id: body.request_id,
        })
    }
}
