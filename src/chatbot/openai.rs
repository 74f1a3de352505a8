//! OpenAI-compatible client for text completions and image generation.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Returned in place of the completion text when the API gives none.
pub const MISSING_TEXT_MARKER: &str = "error";

/// Sequence closing every turn in the prompt.
pub const STOP_SEQUENCE: &str = "###";

/// Sampling parameters sent with every completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionParams {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: Option<f64>,
}

/// A generated completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub total_tokens: Option<u64>,
}

/// Price per token in USD, for the usage log line.
pub fn price_per_token(model: &str) -> f64 {
    match model {
        "text-davinci-003" => 0.00002,
        "text-curie-001" => 0.000002,
        "text-babbage-001" => 0.0000005,
        "text-ada-001" => 0.0000004,
        _ => 0.0,
    }
}

#[derive(Debug)]
pub enum Error {
    Http(String),
    Api { status: u16, message: String },
    /// The image prompt was rejected by the provider's safety system.
    ContentPolicy(String),
    Parse(String),
    Empty,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Api { status, message } => write!(f, "API error {status}: {message}"),
            Error::ContentPolicy(e) => write!(f, "Rejected by safety system: {e}"),
            Error::Parse(e) => write!(f, "Parse error: {e}"),
            Error::Empty => write!(f, "Empty response"),
        }
    }
}

impl std::error::Error for Error {}

/// The text and image generation operations the relay depends on.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn complete(&self, prompt: &str, params: &CompletionParams) -> Result<Completion, Error>;

    /// Generate one image and return its URL.
    async fn generate_image(&self, prompt: &str) -> Result<String, Error>;
}

pub struct Client {
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    temperature: f64,
    max_tokens: u32,
    frequency_penalty: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f64>,
    stop: [&'static str; 1],
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    text: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: u64,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    prompt: &'a str,
    n: u32,
    response_format: &'static str,
}

#[derive(Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    url: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl ApiError {
    fn is_content_policy(&self) -> bool {
        self.code.as_deref() == Some("content_policy_violation")
            || self.kind.as_deref() == Some("image_generation_user_error")
            || self.message.contains("safety system")
    }
}

impl Client {
    /// `base_url` is the API root, e.g. `https://api.openai.com/v1`.
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn post<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R, Error> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Http(format!("Failed to read response: {e}")))?;
        debug!("{} response status: {}", path, status);

        if !status.is_success() {
            return Err(match serde_json::from_str::<ErrorEnvelope>(&body) {
                Ok(envelope) if envelope.error.is_content_policy() => Error::ContentPolicy(envelope.error.message),
                Ok(envelope) => Error::Api {
                    status: status.as_u16(),
                    message: envelope.error.message,
                },
                Err(_) => Error::Api {
                    status: status.as_u16(),
                    message: body,
                },
            });
        }

        serde_json::from_str(&body).map_err(|e| Error::Parse(e.to_string()))
    }
}

#[async_trait]
impl Backend for Client {
    async fn complete(&self, prompt: &str, params: &CompletionParams) -> Result<Completion, Error> {
        let request = CompletionRequest {
            model: &params.model,
            prompt,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            frequency_penalty: params.frequency_penalty,
            presence_penalty: params.presence_penalty,
            stop: [STOP_SEQUENCE],
        };

        let response: CompletionResponse = self.post("/completions", &request).await?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.text)
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| MISSING_TEXT_MARKER.to_string());

        Ok(Completion {
            text,
            total_tokens: response.usage.map(|u| u.total_tokens),
        })
    }

    async fn generate_image(&self, prompt: &str) -> Result<String, Error> {
        info!("🎨 Generating image: {}", prompt);

        let request = ImageRequest {
            prompt,
            n: 1,
            response_format: "url",
        };

        let response: ImageResponse = self.post("/images/generations", &request).await?;

        response
            .data
            .into_iter()
            .next()
            .and_then(|d| d.url)
            .filter(|u| !u.is_empty())
            .ok_or(Error::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_omits_unset_presence_penalty() {
        let request = CompletionRequest {
            model: "text-davinci-003",
            prompt: "hi",
            temperature: 0.5,
            max_tokens: 300,
            frequency_penalty: 1.0,
            presence_penalty: None,
            stop: [STOP_SEQUENCE],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("presence_penalty").is_none());
        assert_eq!(json["stop"], serde_json::json!(["###"]));
    }

    #[test]
    fn test_content_policy_detection() {
        let envelope: ErrorEnvelope = serde_json::from_str(
            r#"{"error": {"code": "content_policy_violation", "message": "nope", "type": "invalid_request_error"}}"#,
        )
        .unwrap();
        assert!(envelope.error.is_content_policy());

        let envelope: ErrorEnvelope =
            serde_json::from_str(r#"{"error": {"message": "Your request was rejected as a result of our safety system."}}"#)
                .unwrap();
        assert!(envelope.error.is_content_policy());

        let envelope: ErrorEnvelope =
            serde_json::from_str(r#"{"error": {"message": "Rate limit reached", "type": "requests"}}"#).unwrap();
        assert!(!envelope.error.is_content_policy());
    }

    #[test]
    fn test_prices() {
        assert_eq!(price_per_token("text-davinci-003"), 0.00002);
        assert_eq!(price_per_token("gpt-3.5-turbo-instruct"), 0.0);
    }
}
