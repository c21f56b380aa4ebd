use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use log::{error, info};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::errors::TransformError;
use crate::feedback::Feedback;
use crate::intake::CandidateImage;
use crate::surface::{ResultView, Slot, ToastKind, UiSurface};

const GENERIC_HTTP_FAILURE: &str = "Error processing image";
const GENERIC_APP_FAILURE: &str = "Unknown error occurred";
pub const SUCCESS_TOAST: &str = "Image transformed successfully!";

/// Raw reply from the transformation service.
#[derive(Debug, Clone)]
pub struct EndpointReply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl EndpointReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The remote transformation service.
#[async_trait]
pub trait TransformEndpoint: Send + Sync {
    /// Sends the image. Only transport failures are errors; any HTTP status is a reply.
    async fn post_image(&self, candidate: &CandidateImage) -> Result<EndpointReply, TransformError>;
}

pub struct HttpEndpoint {
    client: reqwest::Client,
    url: String,
    file_field: String,
}

impl HttpEndpoint {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.endpoint.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config.transform_url(),
            file_field: config.endpoint.file_field.clone(),
        })
    }
}

#[async_trait]
impl TransformEndpoint for HttpEndpoint {
    async fn post_image(&self, candidate: &CandidateImage) -> Result<EndpointReply, TransformError> {
        let part = reqwest::multipart::Part::bytes(candidate.bytes().to_vec())
            .file_name(candidate.name().to_string())
            .mime_str(candidate.mime_type())
            .map_err(|e| TransformError::Transport(format!("Invalid content type: {}", e)))?;
        let form = reqwest::multipart::Form::new().part(self.file_field.clone(), part);

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TransformError::Transport(format!("Failed to reach transformation service: {}", e)))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransformError::Transport(format!("Failed to read response: {}", e)))?;

        Ok(EndpointReply {
            status,
            body: body.to_vec(),
        })
    }
}

/// JSON contract of the transformation service.
#[derive(Debug, Default, Deserialize)]
pub struct TransformResponse {
    #[serde(default)]
    pub success: bool,
    pub image_bytes: Option<String>,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub toy_description: Option<String>,
    pub main_object: Option<String>,
    pub detected_objects: Option<Vec<String>>,
    pub error: Option<String>,
    /// FastAPI sends a string here, or a list of validation problems.
    pub detail: Option<serde_json::Value>,
}

impl TransformResponse {
    pub fn detail_message(&self) -> Option<String> {
        match self.detail.as_ref()? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) if s.is_empty() => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn into_result(self) -> Result<TransformResult, TransformError> {
        if !self.success {
            let message = self
                .error
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| GENERIC_APP_FAILURE.to_string());
            return Ok(TransformResult::Failure { message });
        }

        let encoded = self
            .image_bytes
            .ok_or_else(|| TransformError::MalformedResponse("response carries no image".to_string()))?;
        let image = STANDARD
            .decode(encoded.trim())
            .map_err(|e| TransformError::MalformedResponse(format!("image is not valid base64: {}", e)))?;
        image::load_from_memory(&image)
            .map_err(|e| TransformError::MalformedResponse(format!("returned image cannot be decoded: {}", e)))?;

        Ok(TransformResult::Success(TransformedImage {
            image,
            image_url: self.image_url,
            description: self.description,
            toy_description: self.toy_description,
            main_object: self.main_object,
            detected_objects: self.detected_objects,
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransformResult {
    Success(TransformedImage),
    Failure { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformedImage {
    pub image: Vec<u8>,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub toy_description: Option<String>,
    pub main_object: Option<String>,
    pub detected_objects: Option<Vec<String>>,
}

impl TransformedImage {
    pub fn to_view(&self) -> ResultView {
        ResultView {
            image: self.image.clone(),
            description: self.description.clone(),
            toy_description: self.toy_description.clone(),
            main_object: self.main_object.as_ref().map(|o| format!("Main object: {}", o)),
            detected_objects: self
                .detected_objects
                .as_ref()
                .map(|objects| format!("Detected objects: {}", objects.join(", "))),
        }
    }
}

/// Turns a reply into a result. The body is parsed whatever the status so a
/// failing reply can still contribute its `detail` message.
pub fn interpret_reply(reply: &EndpointReply) -> Result<TransformResult, TransformError> {
    let parsed = serde_json::from_slice::<TransformResponse>(&reply.body);

    if !reply.is_success() {
        let message = parsed
            .ok()
            .and_then(|response| response.detail_message())
            .unwrap_or_else(|| GENERIC_HTTP_FAILURE.to_string());
        return Err(TransformError::Server {
            status: reply.status,
            message,
        });
    }

    parsed
        .map_err(|e| TransformError::MalformedResponse(e.to_string()))?
        .into_result()
}

pub struct UploadPipeline {
    endpoint: Arc<dyn TransformEndpoint>,
    surface: Arc<dyn UiSurface>,
    feedback: Arc<Feedback>,
}

impl UploadPipeline {
    pub fn new(endpoint: Arc<dyn TransformEndpoint>, surface: Arc<dyn UiSurface>, feedback: Arc<Feedback>) -> Self {
        Self {
            endpoint,
            surface,
            feedback,
        }
    }

    /// Uploads one image and reports the outcome on the surface. The loading
    /// state is ended exactly once, whichever step fails.
    pub async fn upload_image(&self, candidate: &CandidateImage) -> Result<TransformedImage, TransformError> {
        info!("Uploading {} ({} bytes)", candidate.name(), candidate.size());
        let loading = self.feedback.begin_loading();
        self.feedback.clear_error();

        let outcome = self.transform(candidate).await;
        match &outcome {
            Ok(image) => {
                self.surface.show_result(image.to_view());
                self.surface.scroll_into_view(Slot::Result);
                self.feedback.show_toast(SUCCESS_TOAST, ToastKind::Success);
                info!("Transformation succeeded ({} bytes)", image.image.len());
            }
            Err(e) => {
                error!("Upload failed: {:?}", e);
                self.feedback.show_error(&e.user_message());
            }
        }

        loading.finish(outcome.is_ok());
        outcome
    }

    async fn transform(&self, candidate: &CandidateImage) -> Result<TransformedImage, TransformError> {
        let reply = self.endpoint.post_image(candidate).await?;
        match interpret_reply(&reply)? {
            TransformResult::Success(image) => Ok(image),
            TransformResult::Failure { message } => Err(TransformError::Application(message)),
        }
    }
}
