//! Speech synthesizer adapter.
//!
//! Converts the full narration text into an audio track plus a
//! character-level timing map via the ElevenLabs timestamp endpoint.
//! Synthesis failures are not retried here; the external job runner owns
//! retry policy.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use log::{info, warn};
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::{Voice, VoiceSettings};
use crate::error::SynthesisError;

const DEFAULT_API_URL: &str = "https://api.elevenlabs.io/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Parallel per-character timing arrays returned by the provider.
///
/// Start/end times are seconds, monotonically non-decreasing. The map is
/// walked linearly by the caption builder.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacterTimingMap {
    pub characters: Vec<char>,
    pub start_times: Vec<f64>,
    pub end_times: Vec<f64>,
}

impl CharacterTimingMap {
    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    /// Post-condition check on the provider response: the timing arrays
    /// must be parallel and cover every character of the synthesized
    /// text. A violation becomes a typed error here instead of an
    /// out-of-bounds access later.
    pub fn validate_against(&self, text: &str) -> Result<(), SynthesisError> {
        if self.characters.len() != self.start_times.len()
            || self.characters.len() != self.end_times.len()
        {
            return Err(SynthesisError::ContractViolation(format!(
                "alignment arrays disagree: {} characters, {} starts, {} ends",
                self.characters.len(),
                self.start_times.len(),
                self.end_times.len()
            )));
        }
        let expected = text.chars().count();
        if self.characters.len() != expected {
            return Err(SynthesisError::ContractViolation(format!(
                "alignment covers {} characters but input has {}",
                self.characters.len(),
                expected
            )));
        }
        Ok(())
    }
}

/// Synthesized narration: encoded audio bytes plus an optional timing
/// map. A missing map means the provider omitted alignment data; the
/// caption track degrades to omitted rather than the job failing.
#[derive(Debug, Clone)]
pub struct NarrationAudio {
    pub audio: Bytes,
    pub alignment: Option<CharacterTimingMap>,
}

/// Remaining synthesis quota as reported by the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct QuotaInfo {
    pub character_count: u64,
    pub character_limit: u64,
}

impl QuotaInfo {
    pub fn remaining(&self) -> u64 {
        self.character_limit.saturating_sub(self.character_count)
    }
}

/// The seam the orchestrator depends on.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice: &Voice,
    ) -> Result<NarrationAudio, SynthesisError>;
}

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: &'a VoiceSettings,
}

#[derive(Deserialize)]
struct TimestampResponse {
    audio_base64: String,
    alignment: Option<RawAlignment>,
}

#[derive(Deserialize)]
struct RawAlignment {
    characters: Vec<String>,
    character_start_times_seconds: Vec<f64>,
    character_end_times_seconds: Vec<f64>,
}

#[derive(Deserialize)]
struct UserResponse {
    subscription: QuotaInfo,
}

/// ElevenLabs client for the `with-timestamps` synthesis endpoint.
///
/// Constructed once per process and injected into the orchestrator. The
/// response cache means a job retried by the external runner after a
/// failed encode does not spend provider quota twice on identical text.
pub struct ElevenLabsClient {
    client: Client,
    api_key: String,
    base_url: String,
    model_id: String,
    voice_settings: VoiceSettings,
    cache: Mutex<HashMap<String, NarrationAudio>>,
}

impl ElevenLabsClient {
    pub fn new(api_key: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self::with_base_url(api_key, model_id, DEFAULT_API_URL)
    }

    /// Construct against an alternate endpoint. Used by tests.
    pub fn with_base_url(
        api_key: impl Into<String>,
        model_id: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into(),
            model_id: model_id.into(),
            voice_settings: VoiceSettings::default(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_voice_settings(mut self, settings: VoiceSettings) -> Self {
        self.voice_settings = settings;
        self
    }

    /// Remaining provider quota, for preflight logging.
    pub async fn check_quota(&self) -> Result<QuotaInfo, SynthesisError> {
        let url = format!("{}/user", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("xi-api-key", &self.api_key)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(map_provider_status(status, response.text().await.ok()));
        }
        let user: UserResponse = response.json().await?;
        info!(
            "speech quota: {}/{} characters remaining",
            user.subscription.remaining(),
            user.subscription.character_limit
        );
        Ok(user.subscription)
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsClient {
    async fn synthesize(
        &self,
        text: &str,
        voice: &Voice,
    ) -> Result<NarrationAudio, SynthesisError> {
        if text.trim().is_empty() {
            return Err(SynthesisError::MalformedInput(
                "narration text is empty".to_string(),
            ));
        }

        let cache_key = cache_key(text, voice.id(), &self.model_id);
        {
            let cache = self.cache.lock().unwrap();
            if let Some(cached) = cache.get(&cache_key) {
                info!("using cached synthesis for {} characters", text.len());
                return Ok(cached.clone());
            }
        }

        info!(
            "synthesizing {} characters with voice {}",
            text.chars().count(),
            voice.id()
        );

        let url = format!(
            "{}/text-to-speech/{}/with-timestamps",
            self.base_url,
            voice.id()
        );
        let body = SynthesisRequest {
            text,
            model_id: &self.model_id,
            voice_settings: &self.voice_settings,
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.ok();
            return Err(map_provider_status(status, detail));
        }

        let payload: TimestampResponse = response.json().await?;
        let audio = BASE64.decode(payload.audio_base64.as_bytes()).map_err(|e| {
            SynthesisError::ContractViolation(format!("audio payload is not valid base64: {e}"))
        })?;

        let alignment = match payload.alignment {
            Some(raw) => {
                let map = convert_alignment(raw)?;
                map.validate_against(text)?;
                Some(map)
            }
            None => {
                warn!("provider omitted alignment data; captions will be skipped");
                None
            }
        };

        let narration = NarrationAudio {
            audio: Bytes::from(audio),
            alignment,
        };

        {
            let mut cache = self.cache.lock().unwrap();
            cache.insert(cache_key, narration.clone());
        }

        Ok(narration)
    }
}

fn cache_key(text: &str, voice_id: &str, model_id: &str) -> String {
    format!("{:x}", md5::compute(format!("{text}:{voice_id}:{model_id}")))
}

/// Map a provider HTTP status onto the synthesis error taxonomy.
fn map_provider_status(status: StatusCode, detail: Option<String>) -> SynthesisError {
    let detail = detail
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| status.to_string());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SynthesisError::Unauthorized(detail),
        StatusCode::TOO_MANY_REQUESTS => SynthesisError::QuotaExceeded(detail),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            SynthesisError::MalformedInput(detail)
        }
        _ => SynthesisError::Provider(format!("status {status}: {detail}")),
    }
}

/// Convert the provider's string-per-character arrays into the internal
/// map. Each entry must hold exactly one character.
fn convert_alignment(raw: RawAlignment) -> Result<CharacterTimingMap, SynthesisError> {
    let mut characters = Vec::with_capacity(raw.characters.len());
    for entry in &raw.characters {
        let mut chars = entry.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => characters.push(c),
            _ => {
                return Err(SynthesisError::ContractViolation(format!(
                    "alignment entry {entry:?} is not a single character"
                )))
            }
        }
    }
    Ok(CharacterTimingMap {
        characters,
        start_times: raw.character_start_times_seconds,
        end_times: raw.character_end_times_seconds,
    })
}
