use log::{debug, warn};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use super::{build_prompt, truncate_chars, ClassificationResult, Classifier, FALLBACK_LABEL};
use crate::config::ClassifierConfig;
use crate::error::ClassifyError;

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Label from the first part of the first candidate, if there is one.
fn first_label(resp: &GenerateResponse) -> Option<&str> {
    resp.candidates
        .first()?
        .content
        .as_ref()?
        .parts
        .first()?
        .text
        .as_deref()
}

/// Transport error text without the request URL.
fn request_err(e: reqwest::Error) -> ClassifyError {
    ClassifyError::Request(e.without_url().to_string())
}

/// Classifier backed by the Gemini `generateContent` endpoint.
pub struct GeminiClassifier {
    http: Client,
    api_key: String,
    model: String,
    base_url: String,
    categories: Vec<String>,
    max_body_chars: usize,
}

impl GeminiClassifier {
    pub fn new(cfg: &ClassifierConfig, categories: Vec<String>) -> Result<Self, ClassifyError> {
        let http = Client::builder()
            .timeout(cfg.timeout())
            .build()
            .map_err(|e| ClassifyError::Request(e.to_string()))?;

        Ok(Self {
            http,
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            categories,
            max_body_chars: cfg.max_body_chars,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

impl Classifier for GeminiClassifier {
    fn classify(
        &mut self,
        subject: &str,
        senders: &str,
        body: &str,
    ) -> Result<ClassificationResult, ClassifyError> {
        let body = truncate_chars(body, self.max_body_chars);
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part {
                    text: build_prompt(&self.categories, subject, senders, body),
                }],
            }],
        };

        debug!("Sending classification request: model={}", self.model);

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .map_err(request_err)?;

        let status = response.status();
        let text = response.text().map_err(request_err)?;

        if !status.is_success() {
            return Err(ClassifyError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&text).map_err(|e| ClassifyError::Decode(e.to_string()))?;

        let label = match first_label(&parsed) {
            Some(label) => label.to_string(),
            None => {
                warn!("Classifier response had no candidates, using {FALLBACK_LABEL}");
                FALLBACK_LABEL.to_string()
            }
        };

        Ok(ClassificationResult {
            label,
            raw: Some(text),
        })
    }
}
