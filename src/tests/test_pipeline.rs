//! Orchestrator tests with stubbed collaborators.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::config::{PipelineConfig, Voice};
use crate::encoder::{EncodeInvocation, Encoder};
use crate::error::{EncodeError, RenderError, SynthesisError};
use crate::job::{JobStatus, MemoryStatusSink};
use crate::pipeline::Pipeline;
use crate::scene::Scene;
use crate::speech::{CharacterTimingMap, NarrationAudio, SpeechSynthesizer};
use crate::storage::{StorageProvider, UploadError};

fn scenes(durations: &[f64]) -> Vec<Scene> {
    let texts = ["Hello world.", "Atlas wins.", "Stay sharp."];
    durations
        .iter()
        .enumerate()
        .map(|(i, d)| Scene {
            index: i,
            duration_seconds: *d,
            narration_text: texts[i % texts.len()].to_string(),
            visual_hint: "confident".to_string(),
        })
        .collect()
}

fn alignment_for(text: &str) -> CharacterTimingMap {
    let characters: Vec<char> = text.chars().collect();
    let start_times: Vec<f64> = (0..characters.len()).map(|i| i as f64 * 0.1).collect();
    let end_times: Vec<f64> = (0..characters.len())
        .map(|i| (i + 1) as f64 * 0.1)
        .collect();
    CharacterTimingMap {
        characters,
        start_times,
        end_times,
    }
}

enum SynthMode {
    Aligned,
    NoAlignment,
    Unauthorized,
}

struct StubSynthesizer {
    mode: SynthMode,
}

#[async_trait]
impl SpeechSynthesizer for StubSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        _voice: &Voice,
    ) -> Result<NarrationAudio, SynthesisError> {
        match self.mode {
            SynthMode::Aligned => Ok(NarrationAudio {
                audio: Bytes::from_static(b"not-really-mp3"),
                alignment: Some(alignment_for(text)),
            }),
            SynthMode::NoAlignment => Ok(NarrationAudio {
                audio: Bytes::from_static(b"not-really-mp3"),
                alignment: None,
            }),
            SynthMode::Unauthorized => Err(SynthesisError::Unauthorized(
                "401 invalid api key".to_string(),
            )),
        }
    }
}

#[derive(Default)]
struct StubStorage {
    uploads: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl StorageProvider for StubStorage {
    async fn upload_video(
        &self,
        _data: Bytes,
        job_id: &str,
        _title: &str,
    ) -> Result<String, UploadError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(UploadError("storage unavailable".to_string()));
        }
        Ok(format!("https://cdn.example.com/videos/{job_id}.mp4"))
    }
}

#[derive(Default)]
struct StubEncoder {
    fail: bool,
    invocations: Mutex<Vec<EncodeInvocation>>,
}

#[async_trait]
impl Encoder for StubEncoder {
    async fn run(
        &self,
        invocation: &EncodeInvocation,
        _cancel: &CancellationToken,
        _progress: Option<tokio::sync::mpsc::Sender<f32>>,
    ) -> Result<(), EncodeError> {
        self.invocations.lock().unwrap().push(invocation.clone());
        if self.fail {
            // Simulates a killed subprocess: nonzero exit, partial output.
            return Err(EncodeError::ExitStatus {
                status: "signal: 9 (SIGKILL)".to_string(),
                stderr_tail: "killed".to_string(),
            });
        }
        std::fs::write(&invocation.output, b"encoded-video").unwrap();
        Ok(())
    }
}

struct Fixture {
    pipeline: Pipeline,
    sink: Arc<MemoryStatusSink>,
    storage: Arc<StubStorage>,
    encoder: Arc<StubEncoder>,
    work_dir: tempfile::TempDir,
}

fn fixture(mode: SynthMode, encoder_fails: bool, storage_fails: bool) -> Fixture {
    let work_dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig {
        work_dir: Some(work_dir.path().to_path_buf()),
        ..PipelineConfig::default()
    };
    let sink = Arc::new(MemoryStatusSink::new());
    let storage = Arc::new(StubStorage {
        fail: storage_fails,
        ..StubStorage::default()
    });
    let encoder = Arc::new(StubEncoder {
        fail: encoder_fails,
        ..StubEncoder::default()
    });
    let pipeline = Pipeline::new(
        config,
        Arc::new(StubSynthesizer { mode }),
        Arc::clone(&storage) as Arc<dyn StorageProvider>,
        Arc::clone(&sink) as Arc<dyn crate::job::StatusSink>,
        Arc::clone(&encoder) as Arc<dyn Encoder>,
    );
    Fixture {
        pipeline,
        sink,
        storage,
        encoder,
        work_dir,
    }
}

fn dir_is_empty(path: &Path) -> bool {
    std::fs::read_dir(path).unwrap().next().is_none()
}

#[tokio::test]
async fn test_successful_render_completes_exactly_once() {
    let f = fixture(SynthMode::Aligned, false, false);
    let scenes = scenes(&[5.0, 5.0, 5.0]);

    let done = f
        .pipeline
        .run("job-ok", &scenes, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(done.video_url, "https://cdn.example.com/videos/job-ok.mp4");
    // Reported duration is the scene-sum figure, not the encoded length.
    assert_eq!(done.duration_seconds, 15.0);
    assert_eq!(f.storage.uploads.load(Ordering::SeqCst), 1);

    let job = f.sink.snapshot("job-ok").unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress_percent, 100);
    assert_eq!(job.video_url.as_deref(), Some(done.video_url.as_str()));
    assert_eq!(job.duration_seconds, Some(15.0));

    // Every intermediate is gone after success.
    assert!(dir_is_empty(f.work_dir.path()));
}

#[tokio::test]
async fn test_progress_is_monotonically_non_decreasing() {
    let f = fixture(SynthMode::Aligned, false, false);
    f.pipeline
        .run("job-progress", &scenes(&[4.0, 6.0]), &CancellationToken::new())
        .await
        .unwrap();

    let percents: Vec<u8> = f
        .sink
        .history()
        .iter()
        .filter_map(|u| u.progress_percent)
        .collect();
    assert!(!percents.is_empty());
    assert!(percents.windows(2).all(|p| p[0] <= p[1]));
    assert_eq!(*percents.last().unwrap(), 100);
}

#[tokio::test]
async fn test_auth_failure_fails_job_without_upload() {
    let f = fixture(SynthMode::Unauthorized, false, false);
    let err = f
        .pipeline
        .run("job-auth", &scenes(&[5.0]), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RenderError::Synthesis(SynthesisError::Unauthorized(_))
    ));

    let job = f.sink.snapshot("job-auth").unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    let message = job.error_message.unwrap();
    assert!(message.contains("credentials"), "message: {message}");

    // No partial upload, no leftover intermediates.
    assert_eq!(f.storage.uploads.load(Ordering::SeqCst), 0);
    assert!(dir_is_empty(f.work_dir.path()));
}

#[tokio::test]
async fn test_killed_encoder_fails_job_and_cleans_temp_files() {
    let f = fixture(SynthMode::Aligned, true, false);
    let err = f
        .pipeline
        .run("job-killed", &scenes(&[5.0, 5.0]), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RenderError::Encode(_)));
    let job = f.sink.snapshot("job-killed").unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error_message.is_some());
    assert!(job.video_url.is_none());

    assert_eq!(f.storage.uploads.load(Ordering::SeqCst), 0);
    assert!(dir_is_empty(f.work_dir.path()));
}

#[tokio::test]
async fn test_upload_failure_is_recorded_and_cleaned() {
    let f = fixture(SynthMode::Aligned, false, true);
    let err = f
        .pipeline
        .run("job-upload", &scenes(&[5.0]), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RenderError::Upload(_)));
    let job = f.sink.snapshot("job-upload").unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.video_url.is_none());
    assert!(dir_is_empty(f.work_dir.path()));
}

#[tokio::test]
async fn test_missing_alignment_degrades_to_uncaptioned_render() {
    let f = fixture(SynthMode::NoAlignment, false, false);
    let done = f
        .pipeline
        .run("job-nocap", &scenes(&[5.0]), &CancellationToken::new())
        .await
        .unwrap();
    assert!(!done.video_url.is_empty());

    // The encoder invocation must not reference a subtitle burn-in.
    let invocations = f.encoder.invocations.lock().unwrap();
    assert_eq!(invocations.len(), 1);
    let filter = invocations[0]
        .args
        .iter()
        .position(|a| a == "-filter_complex")
        .map(|i| invocations[0].args[i + 1].clone())
        .unwrap();
    assert!(!filter.contains("ass="));
}

#[tokio::test]
async fn test_empty_scene_list_is_rejected_before_any_stage() {
    let f = fixture(SynthMode::Aligned, false, false);
    let err = f
        .pipeline
        .run("job-empty", &[], &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RenderError::InputValidation(_)));
    assert_eq!(f.storage.uploads.load(Ordering::SeqCst), 0);
    assert!(f.encoder.invocations.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_encode_invocation_shape() {
    let f = fixture(SynthMode::Aligned, false, false);
    f.pipeline
        .run("job-shape", &scenes(&[5.0, 5.0, 5.0]), &CancellationToken::new())
        .await
        .unwrap();

    let invocations = f.encoder.invocations.lock().unwrap();
    let invocation = &invocations[0];
    // Target length is the scene sum; `-shortest` truncates to the
    // shorter of video and audio at encode time.
    assert_eq!(invocation.expected_duration_seconds, 15.0);
    assert!(invocation.args.contains(&"-shortest".to_string()));
    assert!(invocation.args.contains(&"libx264".to_string()));

    // The concat listing was written with N entries plus the trailing
    // repeat before the encoder ran.
    let concat_idx = invocation.args.iter().position(|a| a == "-i").unwrap();
    let concat_path = &invocation.args[concat_idx + 1];
    assert!(concat_path.ends_with("_concat.txt"));
}
