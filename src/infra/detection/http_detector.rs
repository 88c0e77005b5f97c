use crate::core::moderation::LanguageDetector;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::error::Error;

// Guesses below this confidence are treated as "unknown".
const MIN_CONFIDENCE: f64 = 50.0;

/// One candidate returned by the `/detect` endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Detection {
    language: String,
    confidence: f64,
}

/// Language classifier backed by a LibreTranslate-compatible `/detect` endpoint.
pub struct HttpLanguageDetector {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpLanguageDetector {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    async fn request(&self, text: &str) -> Result<Vec<Detection>, Box<dyn Error + Send + Sync>> {
        let url = format!("{}/detect", self.base_url);
        let mut payload = json!({ "q": text });
        if let Some(key) = &self.api_key {
            payload["api_key"] = json!(key);
        }

        let response = self.client.post(url).json(&payload).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await?;
            return Err(format!("Language detection error: {} - {}", status, text).into());
        }

        Ok(response.json().await?)
    }
}

/// Best candidate above the confidence floor, normalized to our tag set.
fn pick_language(detections: &[Detection]) -> Option<String> {
    let best = detections
        .iter()
        .filter(|d| d.confidence >= MIN_CONFIDENCE)
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))?;

    let tag = best.language.to_lowercase();
    Some(match tag.as_str() {
        "zh" | "zh-hans" => "zh-cn".to_string(),
        "zt" | "zh-hant" => "zh-tw".to_string(),
        _ => tag,
    })
}

#[async_trait]
impl LanguageDetector for HttpLanguageDetector {
    async fn detect(&self, text: &str) -> Option<String> {
        match self.request(text).await {
            Ok(detections) => pick_language(&detections),
            Err(e) => {
                tracing::warn!("Language detection failed: {}", e);
                None
            }
        }
    }
}
