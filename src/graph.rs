//! Render graph assembler.
//!
//! Builds the single encoder invocation for one job: the duration-held
//! image sequence, the narration track, an optional looping background
//! bed, the motion/vignette filter chain, and the optional caption
//! burn-in. Assembly is a small state machine; calling a step out of
//! order is a precondition failure, not undefined behavior.

use std::path::{Path, PathBuf};

use log::{info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::EncodeSettings;
use crate::encoder::{EncodeInvocation, Encoder};
use crate::error::EncodeError;
use crate::util::check_file_exists_and_valid;

/// One frame asset on disk with its hold time.
#[derive(Debug, Clone)]
pub struct SceneFrame {
    pub path: PathBuf,
    pub duration_seconds: f64,
}

/// Assembly states, in order. `EncodeFailed` carries no payload; the
/// diagnostic travels with the returned error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    Prepared,
    ImagesSequenced,
    AudioAttached,
    FilterGraphBuilt,
    Encoding,
    Done,
    EncodeFailed,
}

pub struct RenderGraph {
    settings: EncodeSettings,
    state: GraphState,
    frames: Vec<SceneFrame>,
    narration: Option<PathBuf>,
    music: Option<PathBuf>,
    filter_complex: Option<String>,
    video_label: &'static str,
}

impl RenderGraph {
    pub fn new(settings: EncodeSettings) -> Self {
        Self {
            settings,
            state: GraphState::Prepared,
            frames: Vec::new(),
            narration: None,
            music: None,
            filter_complex: None,
            video_label: "v_final",
        }
    }

    pub fn state(&self) -> GraphState {
        self.state
    }

    fn expect_state(&self, expected: GraphState, step: &str) -> Result<(), EncodeError> {
        if self.state != expected {
            return Err(EncodeError::Precondition(format!(
                "{step} requires state {expected:?}, graph is in {:?}",
                self.state
            )));
        }
        Ok(())
    }

    /// Order the frame assets with their hold times.
    pub fn sequence_images(&mut self, frames: Vec<SceneFrame>) -> Result<(), EncodeError> {
        self.expect_state(GraphState::Prepared, "sequence_images")?;
        if frames.is_empty() {
            return Err(EncodeError::Precondition(
                "image sequence is empty".to_string(),
            ));
        }
        if let Some(bad) = frames
            .iter()
            .find(|f| !f.duration_seconds.is_finite() || f.duration_seconds <= 0.0)
        {
            return Err(EncodeError::Precondition(format!(
                "frame {} has non-positive duration",
                bad.path.display()
            )));
        }
        self.frames = frames;
        self.state = GraphState::ImagesSequenced;
        Ok(())
    }

    /// The concat-demuxer listing. The final entry is repeated once more
    /// with no duration field; the duration-based demuxer drops or
    /// mistimes the last frame without it.
    pub fn concat_listing(&self) -> Result<String, EncodeError> {
        if self.frames.is_empty() {
            return Err(EncodeError::Precondition(
                "concat_listing requires sequenced images".to_string(),
            ));
        }
        let mut listing = String::new();
        for frame in &self.frames {
            listing.push_str(&format!(
                "file '{}'\nduration {}\n",
                frame.path.display(),
                frame.duration_seconds
            ));
        }
        let last = &self.frames[self.frames.len() - 1];
        listing.push_str(&format!("file '{}'\n", last.path.display()));
        Ok(listing)
    }

    /// Attach the narration track, plus the background bed if the
    /// configured asset actually exists on disk. A missing bed is a
    /// feature flag, not an error.
    pub async fn attach_audio(
        &mut self,
        narration: PathBuf,
        music: Option<PathBuf>,
    ) -> Result<(), EncodeError> {
        self.expect_state(GraphState::ImagesSequenced, "attach_audio")?;
        if !check_file_exists_and_valid(&narration).await {
            return Err(EncodeError::Precondition(format!(
                "narration track missing or empty: {}",
                narration.display()
            )));
        }
        self.narration = Some(narration);

        self.music = match music {
            Some(path) if check_file_exists_and_valid(&path).await => {
                info!("background bed attached: {}", path.display());
                Some(path)
            }
            Some(path) => {
                warn!(
                    "background bed not found at {}, narration only",
                    path.display()
                );
                None
            }
            None => None,
        };

        self.state = GraphState::AudioAttached;
        Ok(())
    }

    /// Build the filter chain: continuous slow zoom and vignette on the
    /// image stream, the optional caption burn-in, and either an amix of
    /// narration over the quiet bed or a plain narration pass-through.
    pub fn build_filter_graph(&mut self, captions: Option<&Path>) -> Result<(), EncodeError> {
        self.expect_state(GraphState::AudioAttached, "build_filter_graph")?;

        let s = &self.settings;
        let mut filter = format!(
            "[0:v]zoompan=z='zoom+{zoom}':d=1:x='iw/2-(iw/zoom/2)':y='ih/2-(ih/zoom/2)':s={w}x{h}:fps={fps}[v_zoomed];\
             [v_zoomed]vignette=angle={angle}[v_final]",
            zoom = s.zoom_increment,
            w = s.width,
            h = s.height,
            fps = s.fps,
            angle = s.vignette_angle,
        );

        self.video_label = match captions {
            Some(path) => {
                filter.push_str(&format!(
                    ";[v_final]ass={}[v_sub]",
                    escape_filter_path(path)
                ));
                "v_sub"
            }
            None => "v_final",
        };

        // Input order is concat video, then (optionally) the bed, then
        // narration; the audio labels below depend on it.
        if self.music.is_some() {
            filter.push_str(&format!(
                ";[1:a]volume={bed}[bg];[2:a]volume={vo}[vo];[vo][bg]amix=inputs=2:duration=first[a_final]",
                bed = s.music_volume,
                vo = s.narration_volume,
            ));
        } else {
            filter.push_str(&format!(
                ";[1:a]volume={vo}[a_final]",
                vo = s.narration_volume
            ));
        }

        self.filter_complex = Some(filter);
        self.state = GraphState::FilterGraphBuilt;
        Ok(())
    }

    pub fn filter_complex(&self) -> Option<&str> {
        self.filter_complex.as_deref()
    }

    /// The full encoder argument list. Total output duration truncates
    /// to the shorter of the image sequence and the narration via
    /// `-shortest`.
    pub fn command_args(
        &self,
        concat_file: &Path,
        output: &Path,
    ) -> Result<Vec<String>, EncodeError> {
        if self.state != GraphState::FilterGraphBuilt && self.state != GraphState::Encoding {
            return Err(EncodeError::Precondition(format!(
                "command_args requires a built filter graph, graph is in {:?}",
                self.state
            )));
        }
        let narration = self.narration.as_ref().ok_or_else(|| {
            EncodeError::Precondition("narration track not attached".to_string())
        })?;
        let filter = self.filter_complex.as_ref().ok_or_else(|| {
            EncodeError::Precondition("filter graph not built".to_string())
        })?;

        let mut args: Vec<String> = vec![
            "-y".into(),
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            concat_file.display().to_string(),
        ];
        if let Some(music) = &self.music {
            args.extend([
                "-stream_loop".into(),
                "-1".into(),
                "-i".into(),
                music.display().to_string(),
            ]);
        }
        args.extend(["-i".into(), narration.display().to_string()]);
        args.extend(["-filter_complex".into(), filter.clone()]);
        args.extend([
            "-map".into(),
            format!("[{}]", self.video_label),
            "-map".into(),
            "[a_final]".into(),
            "-c:v".into(),
            "libx264".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-crf".into(),
            self.settings.crf.to_string(),
            "-preset".into(),
            self.settings.preset.clone(),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            "192k".into(),
            "-shortest".into(),
            output.display().to_string(),
        ]);
        Ok(args)
    }

    /// Run the encoder once over the assembled graph. Success requires
    /// the output file to exist and be non-empty.
    pub async fn encode(
        &mut self,
        encoder: &dyn Encoder,
        concat_file: &Path,
        output: &Path,
        cancel: &CancellationToken,
        progress: Option<mpsc::Sender<f32>>,
    ) -> Result<(), EncodeError> {
        self.expect_state(GraphState::FilterGraphBuilt, "encode")?;

        let invocation = EncodeInvocation {
            args: self.command_args(concat_file, output)?,
            output: output.to_path_buf(),
            expected_duration_seconds: self
                .frames
                .iter()
                .map(|f| f.duration_seconds)
                .sum(),
        };

        self.state = GraphState::Encoding;
        if let Err(e) = encoder.run(&invocation, cancel, progress).await {
            self.state = GraphState::EncodeFailed;
            return Err(e);
        }

        if !check_file_exists_and_valid(output).await {
            self.state = GraphState::EncodeFailed;
            return Err(EncodeError::EmptyOutput(output.display().to_string()));
        }

        self.state = GraphState::Done;
        Ok(())
    }
}

/// Escape a path for use inside a filter argument.
fn escape_filter_path(path: &Path) -> String {
    let mut out = String::new();
    for c in path.display().to_string().chars() {
        match c {
            '\\' | ':' | '\'' | ',' | '[' | ']' => {
                out.push('\\');
                out.push(c);
            }
            other => out.push(other),
        }
    }
    out
}
