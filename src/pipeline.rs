//! Pipeline orchestrator.
//!
//! Drives one render job through frame generation, voiceover synthesis,
//! caption construction, the encoder invocation, and upload, persisting
//! progress after each sub-state. Every failure is recorded on the job
//! with a human-readable message before being re-raised, intermediates
//! are removed on success and failure alike, and a job reaches a
//! terminal state exactly once per invocation. Retry policy belongs to
//! the external job runner.

use std::sync::Arc;

use bytes::Bytes;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::captions::{build_caption_events, serialize_ass};
use crate::config::PipelineConfig;
use crate::encoder::Encoder;
use crate::error::{RenderError, Result};
use crate::frames::FrameRenderer;
use crate::graph::{RenderGraph, SceneFrame};
use crate::job::{StatusSink, StatusUpdate};
use crate::progress::Stage;
use crate::scene::{full_narration, total_duration, validate_scenes, Scene};
use crate::speech::SpeechSynthesizer;
use crate::storage::StorageProvider;
use crate::util::ffmpeg::probe_duration;
use crate::util::temp::TempFileManager;

/// The outcome of a successful render.
#[derive(Debug, Clone)]
pub struct CompletedRender {
    pub video_url: String,
    /// Sum of the input scene durations: the figure the intake UI
    /// tracks. The encoded file may be shorter under `-shortest`
    /// truncation; the divergence is logged, not reported.
    pub duration_seconds: f64,
}

/// Orchestrates one job at a time. Clients are constructed once per
/// process and injected; the pipeline holds no global state.
pub struct Pipeline {
    config: PipelineConfig,
    frame_renderer: FrameRenderer,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    storage: Arc<dyn StorageProvider>,
    status: Arc<dyn StatusSink>,
    encoder: Arc<dyn Encoder>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        storage: Arc<dyn StorageProvider>,
        status: Arc<dyn StatusSink>,
        encoder: Arc<dyn Encoder>,
    ) -> Self {
        let frame_renderer = FrameRenderer::new(config.encode.width, config.encode.height);
        Self {
            config,
            frame_renderer,
            synthesizer,
            storage,
            status,
            encoder,
        }
    }

    /// Replace the default frame renderer (e.g. to add a watermark).
    pub fn with_frame_renderer(mut self, renderer: FrameRenderer) -> Self {
        self.frame_renderer = renderer;
        self
    }

    /// Run one job to its terminal state.
    pub async fn run(
        &self,
        job_id: &str,
        scenes: &[Scene],
        cancel: &CancellationToken,
    ) -> Result<CompletedRender> {
        info!("starting render job {} with {} scenes", job_id, scenes.len());

        let mut temp = match &self.config.work_dir {
            Some(dir) => TempFileManager::new_in(dir)?,
            None => TempFileManager::new()?,
        };

        match self.run_stages(job_id, scenes, cancel, &mut temp).await {
            Ok(done) => {
                temp.cleanup();
                Ok(done)
            }
            Err(e) => {
                error!("render job {} failed: {}", job_id, e);
                // Best-effort terminal record; a sink failure here is
                // logged and never masks the original error.
                if let Err(sink_err) = self
                    .status
                    .update(job_id, StatusUpdate::failed(e.to_string()))
                    .await
                {
                    error!("failed to record failure for job {}: {}", job_id, sink_err);
                }
                temp.cleanup();
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        job_id: &str,
        scenes: &[Scene],
        cancel: &CancellationToken,
        temp: &mut TempFileManager,
    ) -> Result<CompletedRender> {
        validate_scenes(scenes)?;

        // 1. One still per scene, held for the scene's duration.
        let stage = Stage::GeneratingFrames;
        self.update_status(job_id, StatusUpdate::processing(stage.label(), stage.percent(0.0)))
            .await?;

        let mut frames = Vec::with_capacity(scenes.len());
        for (i, scene) in scenes.iter().enumerate() {
            info!("generating frame for scene {}/{}", i + 1, scenes.len());
            let bytes = self.frame_renderer.render(scene, scenes.len())?;
            let path = temp.path_for(&format!("{job_id}_scene_{i}.png"));
            tokio::fs::write(&path, &bytes).await?;
            frames.push(SceneFrame {
                path,
                duration_seconds: scene.duration_seconds,
            });
            self.update_status(
                job_id,
                StatusUpdate::processing(
                    format!("Generated {}/{} images", i + 1, scenes.len()),
                    stage.percent((i + 1) as f32 / scenes.len() as f32),
                ),
            )
            .await?;
        }

        // 2. One synthesis call for the whole narration, in scene order.
        let stage = Stage::SynthesizingAudio;
        self.update_status(job_id, StatusUpdate::processing(stage.label(), stage.percent(0.0)))
            .await?;

        let narration_text = full_narration(scenes);
        let narration = self
            .synthesizer
            .synthesize(&narration_text, &self.config.voice)
            .await?;
        let voiceover_path = temp.path_for(&format!("{job_id}_voiceover.mp3"));
        tokio::fs::write(&voiceover_path, &narration.audio).await?;

        // 3. Word-level captions from the character timing map. A
        // provider that omitted alignment degrades to no caption track.
        let stage = Stage::BuildingCaptions;
        self.update_status(job_id, StatusUpdate::processing(stage.label(), stage.percent(0.0)))
            .await?;

        let caption_path = if self.config.burn_captions {
            match &narration.alignment {
                Some(map) => {
                    let events = build_caption_events(map);
                    if events.is_empty() {
                        None
                    } else {
                        let path = temp.path_for(&format!("{job_id}_captions.ass"));
                        tokio::fs::write(&path, serialize_ass(&events)).await?;
                        Some(path)
                    }
                }
                None => {
                    warn!("job {}: no alignment data, rendering without captions", job_id);
                    None
                }
            }
        } else {
            None
        };

        // 4. Assemble the render graph and run the encoder once.
        let stage = Stage::Encoding;
        self.update_status(job_id, StatusUpdate::processing(stage.label(), stage.percent(0.0)))
            .await?;

        let mut graph = RenderGraph::new(self.config.encode.clone());
        graph.sequence_images(frames)?;
        let concat_path = temp.path_for(&format!("{job_id}_concat.txt"));
        tokio::fs::write(&concat_path, graph.concat_listing()?).await?;
        graph
            .attach_audio(voiceover_path, self.config.background_music.clone())
            .await?;
        graph.build_filter_graph(caption_path.as_deref())?;

        let output_path = temp.path_for(&format!("{job_id}.mp4"));
        let (progress_tx, mut progress_rx) = mpsc::channel::<f32>(16);
        let bridge_sink = Arc::clone(&self.status);
        let bridge_job = job_id.to_string();
        let bridge = tokio::spawn(async move {
            let mut last = 0u8;
            while let Some(fraction) = progress_rx.recv().await {
                let percent = Stage::Encoding.percent(fraction);
                if percent > last {
                    last = percent;
                    let _ = bridge_sink
                        .update(
                            &bridge_job,
                            StatusUpdate::processing("Encoding video...", percent),
                        )
                        .await;
                }
            }
        });

        let encode_result = graph
            .encode(
                self.encoder.as_ref(),
                &concat_path,
                &output_path,
                cancel,
                Some(progress_tx),
            )
            .await;
        let _ = bridge.await;
        encode_result?;

        // The reported runtime stays the scene-sum figure; `-shortest`
        // truncation can make the container shorter, which we surface in
        // the log only.
        let reported_duration = total_duration(scenes);
        match probe_duration(&output_path) {
            Ok(measured) if (measured - reported_duration).abs() > 0.5 => warn!(
                "job {}: encoded length {:.2}s differs from scene total {:.2}s",
                job_id, measured, reported_duration
            ),
            Ok(_) => {}
            Err(e) => debug!("duration probe skipped: {}", e),
        }

        // 5. Upload and finish. Partial artifacts are never surfaced:
        // the URL is recorded only after the provider accepted the file.
        let stage = Stage::Uploading;
        self.update_status(job_id, StatusUpdate::processing(stage.label(), stage.percent(0.0)))
            .await?;

        let video_bytes = tokio::fs::read(&output_path).await?;
        let video_url = self
            .storage
            .upload_video(Bytes::from(video_bytes), job_id, &format!("Video {job_id}"))
            .await
            .map_err(|e| RenderError::Upload(e.to_string()))?;

        self.update_status(job_id, StatusUpdate::completed(&video_url, reported_duration))
            .await?;

        info!("render job {} completed: {}", job_id, video_url);
        Ok(CompletedRender {
            video_url,
            duration_seconds: reported_duration,
        })
    }

    async fn update_status(&self, job_id: &str, update: StatusUpdate) -> Result<()> {
        self.status
            .update(job_id, update)
            .await
            .map_err(|e| RenderError::Status(e.to_string()))
    }
}
