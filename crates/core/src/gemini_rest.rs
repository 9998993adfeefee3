use crate::services::{ImageGenerator, TextGenerator, VisionAnalyzer};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GenerateContentResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CandidateContent {
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        Some(text)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PredictResponse {
    predictions: Vec<Prediction>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: Option<String>,
}

impl PredictResponse {
    fn first_image(&self) -> Result<Option<Vec<u8>>> {
        let Some(encoded) = self
            .predictions
            .iter()
            .find_map(|p| p.bytes_base64_encoded.as_deref())
        else {
            return Ok(None);
        };
        let bytes = general_purpose::STANDARD
            .decode(encoded)
            .context("Image model returned invalid base64")?;
        Ok(Some(bytes))
    }
}

/// REST client for the Gemini content and Imagen endpoints.
///
/// Implements the analysis, text-generation and image-generation capabilities.
pub struct GeminiRestClient {
    client: Client,
    base_url: String,
    api_key: SecretString,
    text_model: String,
    image_model: String,
}

impl GeminiRestClient {
    pub fn new(api_key: SecretString, text_model: String, image_model: String) -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_API_BASE.to_string(),
            api_key,
            text_model,
            image_model,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn post(&self, model: &str, method: &str, body: &Value) -> Result<reqwest::Response> {
        let url = format!("{}/models/{}:{}", self.base_url, model, method);
        self.client
            .post(&url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(body)
            .send()
            .await
            .with_context(|| format!("Request to {model}:{method} failed"))?
            .error_for_status()
            .with_context(|| format!("{model}:{method} returned an error status"))
    }

    async fn generate_content(
        &self,
        parts: Vec<Value>,
        temperature: f32,
        max_output_tokens: u32,
    ) -> Result<String> {
        let body = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": {
                "temperature": temperature,
                "maxOutputTokens": max_output_tokens,
            }
        });
        let resp = self
            .post(&self.text_model, "generateContent", &body)
            .await?
            .json::<GenerateContentResponse>()
            .await
            .context("Failed to decode generateContent response")?;
        resp.text()
            .ok_or_else(|| anyhow::anyhow!("No candidates in generateContent response"))
    }
}

#[async_trait]
impl VisionAnalyzer for GeminiRestClient {
    async fn analyze(&self, image: &[u8], mime_type: &str, prompt: &str) -> Result<String> {
        let parts = vec![
            json!({
                "inline_data": {
                    "mime_type": mime_type,
                    "data": general_purpose::STANDARD.encode(image),
                }
            }),
            json!({ "text": prompt }),
        ];
        self.generate_content(parts, 0.1, 512).await
    }
}

#[async_trait]
impl TextGenerator for GeminiRestClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_content(vec![json!({ "text": prompt })], 0.7, 2048)
            .await
    }
}

#[async_trait]
impl ImageGenerator for GeminiRestClient {
    async fn generate_image(&self, prompt: &str) -> Result<Option<Vec<u8>>> {
        let body = json!({
            "instances": [{ "prompt": prompt }],
            "parameters": {
                "sampleCount": 1,
                "aspectRatio": "4:3",
                "personGeneration": "dont_allow",
            }
        });
        let resp = self
            .post(&self.image_model, "predict", &body)
            .await?
            .json::<PredictResponse>()
            .await
            .context("Failed to decode predict response")?;
        resp.first_image()
    }
}
