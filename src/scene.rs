//! Scene model and intake.
//!
//! A scene is one narrated visual beat with a target duration. Scenes are
//! immutable once handed to the pipeline; the sum of their durations is
//! the runtime figure reported on the finished job.

use serde::{Deserialize, Serialize};

use crate::error::RenderError;

/// Safe duration range applied to intake values that are missing or out
/// of any plausible bound. UI-generated scenes sit in 4-6s, but the
/// pipeline accepts any positive duration.
const MIN_DURATION_SECS: f64 = 1.0;
const MAX_DURATION_SECS: f64 = 60.0;
const DEFAULT_DURATION_SECS: f64 = 5.0;

/// One visual beat of the video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    /// Zero-based position in the video.
    pub index: usize,
    /// Target hold time for this scene's frame, in seconds.
    pub duration_seconds: f64,
    /// Narration spoken over this scene.
    pub narration_text: String,
    /// Free-form hint used to select a visual treatment.
    pub visual_hint: String,
}

/// Raw intake shape produced by the external scene generator. Tolerant:
/// unknown fields are ignored and missing fields get conservative
/// defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct SceneInput {
    #[serde(default)]
    pub scene_number: Option<usize>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub narration_text: Option<String>,
    #[serde(default)]
    pub visual_hint: Option<String>,
    #[serde(default)]
    pub transition: Option<String>,
}

impl SceneInput {
    /// Apply intake defaults and produce an immutable [`Scene`].
    fn into_scene(self, position: usize) -> Scene {
        let duration = match self.duration {
            Some(d) if d.is_finite() && d > 0.0 => d.clamp(MIN_DURATION_SECS, MAX_DURATION_SECS),
            _ => DEFAULT_DURATION_SECS,
        };

        // Missing narration becomes empty rather than null; the visual
        // hint falls back to the scene description when absent.
        let narration = self.narration_text.unwrap_or_default();
        let hint = self
            .visual_hint
            .or(self.description)
            .unwrap_or_default();

        Scene {
            index: self.scene_number.unwrap_or(position),
            duration_seconds: duration,
            narration_text: narration,
            visual_hint: hint,
        }
    }
}

/// Convert an intake list into validated scenes.
///
/// Rejects an empty list and a list whose narration is entirely empty;
/// either means there is nothing to render and no retry will fix it.
pub fn scenes_from_inputs(inputs: Vec<SceneInput>) -> Result<Vec<Scene>, RenderError> {
    if inputs.is_empty() {
        return Err(RenderError::InputValidation(
            "scene list is empty".to_string(),
        ));
    }

    let scenes: Vec<Scene> = inputs
        .into_iter()
        .enumerate()
        .map(|(i, input)| input.into_scene(i))
        .collect();

    if scenes
        .iter()
        .all(|s| s.narration_text.trim().is_empty())
    {
        return Err(RenderError::InputValidation(
            "no scene carries narration text".to_string(),
        ));
    }

    Ok(scenes)
}

/// Validate a scene list handed directly to the pipeline.
pub fn validate_scenes(scenes: &[Scene]) -> Result<(), RenderError> {
    if scenes.is_empty() {
        return Err(RenderError::InputValidation(
            "scene list is empty".to_string(),
        ));
    }
    for scene in scenes {
        if !scene.duration_seconds.is_finite() || scene.duration_seconds <= 0.0 {
            return Err(RenderError::InputValidation(format!(
                "scene {} has non-positive duration {}",
                scene.index, scene.duration_seconds
            )));
        }
    }
    if scenes
        .iter()
        .all(|s| s.narration_text.trim().is_empty())
    {
        return Err(RenderError::InputValidation(
            "no scene carries narration text".to_string(),
        ));
    }
    Ok(())
}

/// Concatenate scene narrations in scene order, space-joined.
///
/// The separator is load-bearing: the synthesized character timing map is
/// walked linearly by the caption builder, which has no other way to
/// associate timings with scene boundaries. Keep it a single space.
pub fn full_narration(scenes: &[Scene]) -> String {
    scenes
        .iter()
        .map(|s| s.narration_text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Total target runtime: the sum of scene durations. This is the figure
/// reported on the completed job, independent of the encoded length.
pub fn total_duration(scenes: &[Scene]) -> f64 {
    scenes.iter().map(|s| s.duration_seconds).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intake_defaults() {
        let json = r#"[
            {"scene_number": 1, "duration": 5.0, "narration_text": "Hello.", "visual_hint": "confident"},
            {"narration_text": "World."},
            {"duration": -3.0, "narration_text": "Clamped.", "unknown_field": true}
        ]"#;
        let inputs: Vec<SceneInput> = serde_json::from_str(json).unwrap();
        let scenes = scenes_from_inputs(inputs).unwrap();

        assert_eq!(scenes.len(), 3);
        assert_eq!(scenes[0].index, 1);
        assert_eq!(scenes[1].index, 1); // positional fallback
        assert_eq!(scenes[1].duration_seconds, DEFAULT_DURATION_SECS);
        assert_eq!(scenes[2].duration_seconds, DEFAULT_DURATION_SECS);
        assert_eq!(scenes[1].visual_hint, "");
    }

    #[test]
    fn test_intake_rejects_empty_list() {
        assert!(matches!(
            scenes_from_inputs(Vec::new()),
            Err(RenderError::InputValidation(_))
        ));
    }

    #[test]
    fn test_intake_rejects_silent_script() {
        let inputs: Vec<SceneInput> =
            serde_json::from_str(r#"[{"duration": 5.0}, {"duration": 4.0}]"#).unwrap();
        assert!(matches!(
            scenes_from_inputs(inputs),
            Err(RenderError::InputValidation(_))
        ));
    }

    #[test]
    fn test_full_narration_is_space_joined_in_order() {
        let scenes = vec![
            Scene {
                index: 0,
                duration_seconds: 5.0,
                narration_text: "Hello world.".to_string(),
                visual_hint: String::new(),
            },
            Scene {
                index: 1,
                duration_seconds: 5.0,
                narration_text: " Atlas wins. ".to_string(),
                visual_hint: String::new(),
            },
        ];
        assert_eq!(full_narration(&scenes), "Hello world. Atlas wins.");
        assert_eq!(total_duration(&scenes), 10.0);
    }

    #[test]
    fn test_validate_rejects_nonpositive_duration() {
        let scenes = vec![Scene {
            index: 0,
            duration_seconds: 0.0,
            narration_text: "text".to_string(),
            visual_hint: String::new(),
        }];
        assert!(validate_scenes(&scenes).is_err());
    }
}
