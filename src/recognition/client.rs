//! Gemini `generateContent` client for song identification
//!
//! One request per clip: the instruction prompt, the clip as inline base64
//! data, search grounding enabled and a low temperature.

use std::time::Duration;
use tracing::{debug, info, warn};

use super::parse::{parse_reply, ParsedReply};
use super::prompt::RECOGNITION_PROMPT;
use super::song::{dedupe_links, SongRecord};
use super::wire::{
    Content, ErrorEnvelope, GenerateContentRequest, GenerateContentResponse, GenerationConfig,
    GoogleSearch, InlineData, Part, Tool,
};
use super::{RecognitionError, Recognizer};
use crate::audio::AudioClip;
use crate::config::RecognitionConfig;

const USER_AGENT: &str = concat!("tunegem/", env!("CARGO_PKG_VERSION"));

/// Client for the hosted recognition model
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http_client: reqwest::Client,
    api_base: String,
    model: String,
    api_key: String,
    temperature: f32,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(config: &RecognitionConfig, api_key: String) -> Result<Self, RecognitionError> {
        if api_key.trim().is_empty() {
            return Err(RecognitionError::MissingApiKey);
        }

        let timeout = Duration::from_secs(config.timeout_secs);
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| RecognitionError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }

    fn build_request(&self, clip: &AudioClip) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part {
                        text: Some(RECOGNITION_PROMPT.to_string()),
                        inline_data: None,
                    },
                    Part {
                        text: None,
                        inline_data: Some(InlineData {
                            mime_type: clip.mime_type().to_string(),
                            data: clip.to_base64(),
                        }),
                    },
                ],
            }],
            tools: vec![Tool {
                google_search: GoogleSearch::default(),
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        }
    }

    async fn generate(&self, clip: &AudioClip) -> Result<GenerateContentResponse, RecognitionError> {
        let request = self.build_request(clip);

        let response = self
            .http_client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RecognitionError::Timeout(self.timeout.as_secs())
                } else {
                    RecognitionError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|envelope| envelope.error.message)
                .unwrap_or(body);
            return Err(RecognitionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|e| RecognitionError::InvalidResponse(e.to_string()))
    }
}

#[async_trait::async_trait]
impl Recognizer for GeminiClient {
    async fn identify(&self, clip: &AudioClip) -> Result<Option<SongRecord>, RecognitionError> {
        info!(
            "Analyzing clip: {} bytes, {}, {:.1}s (model {})",
            clip.len(),
            clip.mime_type(),
            clip.duration().as_secs_f64(),
            self.model
        );

        let response = self.generate(clip).await.map_err(|e| {
            warn!("Recognition request failed: {}", e);
            e
        })?;

        let Some(text) = response.text() else {
            info!("Model returned no text");
            return Ok(None);
        };
        debug!("Model reply: {}", text);

        let candidate = match parse_reply(&text) {
            ParsedReply::Song(candidate) => candidate,
            ParsedReply::Unparseable => return Ok(None),
        };

        let source_links = dedupe_links(response.grounding_uris());

        info!(
            "Identified \"{}\" by {} ({:.0}% confidence, {} sources)",
            candidate.title,
            candidate.artist,
            candidate.confidence,
            source_links.len()
        );

        Ok(Some(SongRecord {
            artist: candidate.artist,
            title: candidate.title,
            genre: candidate.genre,
            fun_fact: candidate.fun_fact,
            confidence: candidate.confidence,
            source_links,
        }))
    }
}
