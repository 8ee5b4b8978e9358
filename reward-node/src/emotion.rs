#![forbid(unsafe_code)]

//! Emotion classifier adapter.
//!
//! The model runs out of process; this module turns an image into a dominant
//! emotion label plus an integer confidence score in percent. The score is
//! what the reward policy consumes, so the float-to-integer conversion here
//! is the only place classifier confidence is interpreted.

use crate::config::ClassifierConfig;
use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::Duration;

/// Dominant emotion with its confidence in whole percent (0-100).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmotionScore {
    pub emotion: String,
    pub score: u32,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ClassifierError {
    #[error("classifier request failed: {0}")]
    Network(String),
    #[error("classifier returned an unusable response: {0}")]
    Decode(String),
    #[error("no face detected in image")]
    NoFace,
}

#[async_trait]
pub trait EmotionClassifier: Send + Sync {
    async fn classify(&self, image: &[u8]) -> Result<EmotionScore, ClassifierError>;
}

/// Decode the request's image payload. Accepts both a bare base64 string and
/// a `data:image/...;base64,` URL, of which only the part after the comma is
/// base64.
pub fn decode_image_payload(raw: &str) -> Result<Vec<u8>, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("empty image payload".to_string());
    }
    let b64 = match trimmed.split_once(',') {
        Some((_, rest)) => rest,
        None => trimmed,
    };
    base64::engine::general_purpose::STANDARD
        .decode(b64.as_bytes())
        .map_err(|e| format!("invalid base64 image payload: {e}"))
}

/// Confidence ratio to whole percent, truncating. Out-of-range input clamps
/// to the valid band.
fn score_percent(confidence: f64) -> u32 {
    let clamped = confidence.clamp(0.0, 1.0);
    (clamped * 100.0) as u32
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    emotion: Option<String>,
    confidence: Option<f64>,
}

/// HTTP adapter posting images to the out-of-process model endpoint.
pub struct HttpEmotionClassifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpEmotionClassifier {
    pub fn new(cfg: &ClassifierConfig) -> Result<Self, String> {
        if cfg.endpoint.trim().is_empty() {
            return Err("classifier.endpoint is empty".to_string());
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| format!("failed to build classifier http client: {e}"))?;
        Ok(Self {
            client,
            endpoint: cfg.endpoint.clone(),
        })
    }
}

#[async_trait]
impl EmotionClassifier for HttpEmotionClassifier {
    async fn classify(&self, image: &[u8]) -> Result<EmotionScore, ClassifierError> {
        let body = serde_json::json!({
            "image": base64::engine::general_purpose::STANDARD.encode(image),
        });
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClassifierError::Network(e.to_string()))?;
        let resp = resp
            .error_for_status()
            .map_err(|e| ClassifierError::Network(e.to_string()))?;
        let decoded: ClassifyResponse = resp
            .json()
            .await
            .map_err(|e| ClassifierError::Decode(e.to_string()))?;

        let emotion = decoded.emotion.ok_or(ClassifierError::NoFace)?;
        Ok(EmotionScore {
            emotion,
            score: score_percent(decoded.confidence.unwrap_or(0.0)),
        })
    }
}

/// Classifier returning a scripted result, for tests and offline smoke runs.
pub struct FixedEmotionClassifier {
    result: Mutex<Result<EmotionScore, ClassifierError>>,
}

impl FixedEmotionClassifier {
    pub fn scoring(emotion: &str, score: u32) -> Self {
        Self {
            result: Mutex::new(Ok(EmotionScore {
                emotion: emotion.to_string(),
                score,
            })),
        }
    }

    pub fn failing(err: ClassifierError) -> Self {
        Self {
            result: Mutex::new(Err(err)),
        }
    }
}

#[async_trait]
impl EmotionClassifier for FixedEmotionClassifier {
    async fn classify(&self, _image: &[u8]) -> Result<EmotionScore, ClassifierError> {
        self.result.lock().expect("mutex poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_payload_decodes_past_the_comma() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"jpeg bytes");
        let raw = format!("data:image/jpeg;base64,{encoded}");
        assert_eq!(decode_image_payload(&raw).unwrap(), b"jpeg bytes");
    }

    #[test]
    fn bare_base64_payload_decodes() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"jpeg bytes");
        assert_eq!(decode_image_payload(&encoded).unwrap(), b"jpeg bytes");
    }

    #[test]
    fn empty_and_garbage_payloads_are_rejected() {
        assert!(decode_image_payload("").is_err());
        assert!(decode_image_payload("   ").is_err());
        assert!(decode_image_payload("data:image/png;base64,!!!").is_err());
    }

    #[test]
    fn score_percent_truncates_and_clamps() {
        assert_eq!(score_percent(0.0), 0);
        assert_eq!(score_percent(0.499), 49);
        assert_eq!(score_percent(0.5), 50);
        assert_eq!(score_percent(0.999), 99);
        assert_eq!(score_percent(1.0), 100);
        assert_eq!(score_percent(-0.3), 0);
        assert_eq!(score_percent(3.0), 100);
    }

    #[tokio::test]
    async fn fixed_classifier_replays_its_script() {
        let c = FixedEmotionClassifier::scoring("happy", 92);
        let got = c.classify(b"ignored").await.unwrap();
        assert_eq!(got.emotion, "happy");
        assert_eq!(got.score, 92);

        let c = FixedEmotionClassifier::failing(ClassifierError::NoFace);
        assert!(matches!(
            c.classify(b"ignored").await,
            Err(ClassifierError::NoFace)
        ));
    }
}
