//! Render worker.
//!
//! Runs exactly one job per invocation: the external job runner supplies
//! the scene list, invokes this binary, and applies its own retry and
//! dead-letter policy based on the exit code.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use scenecast::config::{PipelineConfig, Voice};
use scenecast::encoder::FfmpegEncoder;
use scenecast::frames::FrameRenderer;
use scenecast::job::{HttpStatusSink, MemoryStatusSink, StatusSink};
use scenecast::pipeline::Pipeline;
use scenecast::scene::{scenes_from_inputs, SceneInput};
use scenecast::speech::ElevenLabsClient;
use scenecast::storage::HttpStorage;
use scenecast::util::logger;

#[derive(Parser, Debug)]
#[command(name = "scenecast")]
#[command(about = "Render a narrated scene script into a finished video", long_about = None)]
struct Args {
    /// Path to the scene list JSON (array of scene descriptors)
    #[arg(short, long)]
    scenes: PathBuf,

    /// Job identifier; generated when omitted
    #[arg(short, long)]
    job_id: Option<String>,

    /// Narrator voice (adam, antoni, arnold, or a provider voice id)
    #[arg(long, default_value = "adam")]
    voice: String,

    /// Optional looping background music bed
    #[arg(long)]
    music: Option<PathBuf>,

    /// Status sink endpoint; falls back to in-process tracking
    #[arg(long, env = "STATUS_ENDPOINT")]
    status_endpoint: Option<String>,

    /// Storage upload endpoint
    #[arg(long, env = "STORAGE_UPLOAD_URL")]
    storage_endpoint: String,

    /// Skip the caption burn-in
    #[arg(long)]
    no_captions: bool,

    /// Watermark line drawn on every frame
    #[arg(long)]
    watermark: Option<String>,

    /// Working directory for per-job scratch space
    #[arg(short = 'w', long)]
    work_dir: Option<PathBuf>,

    /// Encoder timeout in seconds
    #[arg(long, default_value_t = 600)]
    encode_timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger::init_logger();
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let api_key = std::env::var("ELEVENLABS_API_KEY")
        .context("ELEVENLABS_API_KEY not configured; set it in the environment or .env")?;

    let raw = tokio::fs::read_to_string(&args.scenes)
        .await
        .with_context(|| format!("failed to read scene list {}", args.scenes.display()))?;
    let inputs: Vec<SceneInput> =
        serde_json::from_str(&raw).context("scene list is not a JSON array of scenes")?;
    let scenes = scenes_from_inputs(inputs)?;

    let job_id = args
        .job_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    info!("job {}: {} scenes", job_id, scenes.len());

    let mut config = PipelineConfig {
        voice: Voice::from_name(&args.voice),
        background_music: args.music,
        burn_captions: !args.no_captions,
        work_dir: args.work_dir,
        ..PipelineConfig::default()
    };
    config.encode.timeout_secs = args.encode_timeout;

    let synthesizer = Arc::new(
        ElevenLabsClient::new(api_key, config.speech_model.clone())
            .with_voice_settings(config.voice_settings.clone()),
    );
    if let Ok(quota) = synthesizer.check_quota().await {
        let needed: usize = scenes
            .iter()
            .map(|s| s.narration_text.chars().count())
            .sum();
        if (quota.remaining() as usize) < needed {
            warn!(
                "speech quota low: {} characters remaining, ~{} needed",
                quota.remaining(),
                needed
            );
        }
    }

    let storage = Arc::new(HttpStorage::new(args.storage_endpoint));
    let status: Arc<dyn StatusSink> = match args.status_endpoint {
        Some(endpoint) => Arc::new(HttpStatusSink::new(endpoint)),
        None => Arc::new(MemoryStatusSink::new()),
    };
    let encoder = Arc::new(
        FfmpegEncoder::discover(Duration::from_secs(config.encode.timeout_secs))
            .map_err(|e| anyhow::anyhow!("{e}"))?,
    );

    let mut renderer = FrameRenderer::new(config.encode.width, config.encode.height);
    if let Some(watermark) = &args.watermark {
        renderer = renderer.with_watermark(watermark.clone());
    }

    let pipeline =
        Pipeline::new(config, synthesizer, storage, status, encoder).with_frame_renderer(renderer);

    // One Ctrl-C cancels the encode and fails the job with cleanup.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling render");
            signal_cancel.cancel();
        }
    });

    match pipeline.run(&job_id, &scenes, &cancel).await {
        Ok(done) => {
            info!(
                "video ready: {} ({:.1}s)",
                done.video_url, done.duration_seconds
            );
            println!("{}", done.video_url);
            Ok(())
        }
        Err(e) => {
            error!("job {} failed: {}", job_id, e);
            bail!("render failed: {e}");
        }
    }
}
