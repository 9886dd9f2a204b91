//! Pipeline configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Voice selection for the speech provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Voice {
    /// Deep, authoritative. The default narrator.
    Adam,
    /// Well-rounded, friendly.
    Antoni,
    /// Crisp, motivational.
    Arnold,
    /// Any other provider voice id.
    Custom(String),
}

impl Default for Voice {
    fn default() -> Self {
        Self::Adam
    }
}

impl Voice {
    /// Provider voice id.
    pub fn id(&self) -> &str {
        match self {
            Self::Adam => "pNInz6obpgDQGcFmaJgB",
            Self::Antoni => "ErXwobaYiN019PkySvjV",
            Self::Arnold => "VR6AewLTigWG4xSOukaG",
            Self::Custom(id) => id,
        }
    }

    /// Parse a user-facing voice name, falling back to the default.
    pub fn from_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "adam" => Self::Adam,
            "antoni" => Self::Antoni,
            "arnold" => Self::Arnold,
            other if !other.is_empty() => Self::Custom(other.to_string()),
            _ => Self::default(),
        }
    }
}

/// Voice settings sent with every synthesis request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.75,
        }
    }
}

/// Encoder profile. One fixed target codec; multi-codec correctness is a
/// non-goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodeSettings {
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Output frame rate.
    pub fps: u32,
    /// x264 constant rate factor.
    pub crf: u8,
    /// x264 preset.
    pub preset: String,
    /// Per-frame zoom increment for the slow-zoom motion treatment.
    pub zoom_increment: f64,
    /// Vignette angle passed to the darkening filter.
    pub vignette_angle: f64,
    /// Relative volume of the background music bed when present.
    pub music_volume: f64,
    /// Volume of the narration track.
    pub narration_volume: f64,
    /// Hard ceiling on one encoder invocation.
    pub timeout_secs: u64,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 30,
            crf: 18,
            preset: "fast".to_string(),
            zoom_increment: 0.001,
            vignette_angle: 0.3,
            music_volume: 0.12,
            narration_volume: 1.0,
            timeout_secs: 600,
        }
    }
}

/// Top-level configuration for one pipeline instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Narrator voice.
    pub voice: Voice,
    /// Synthesis model id.
    pub speech_model: String,
    /// Voice settings for synthesis requests.
    pub voice_settings: VoiceSettings,
    /// Encoder profile.
    pub encode: EncodeSettings,
    /// Optional looping background music bed. Its absence is a feature
    /// flag, not an error.
    pub background_music: Option<PathBuf>,
    /// Burn the word-level caption track into the video stream.
    pub burn_captions: bool,
    /// Parent directory for per-job scratch space. `None` uses the system
    /// temp dir.
    pub work_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            voice: Voice::default(),
            speech_model: "eleven_multilingual_v2".to_string(),
            voice_settings: VoiceSettings::default(),
            encode: EncodeSettings::default(),
            background_music: None,
            burn_captions: true,
            work_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_from_name() {
        assert_eq!(Voice::from_name("adam"), Voice::Adam);
        assert_eq!(Voice::from_name("ARNOLD"), Voice::Arnold);
        assert_eq!(
            Voice::from_name("xyzVoiceId"),
            Voice::Custom("xyzvoiceid".to_string())
        );
        assert_eq!(Voice::from_name(""), Voice::Adam);
    }

    #[test]
    fn test_config_roundtrip() {
        let config = PipelineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.encode.width, 1920);
        assert_eq!(back.encode.fps, 30);
        assert!(back.burn_captions);
    }
}
