//! Command-line front end.
//!
//! Usage:
//!   kling-video generate prompts.json 1,2 3       Two jobs: prompts 1+2, and prompt 3
//!   kling-video extend VIDEO_ID [prompts.json 4]  Extend a video, optionally with a prompt
//!   kling-video status TASK_ID [--extension]      Check a task once

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::api::StatusProber;
use crate::api::kling::KlingClient;
use crate::config::Config;
use crate::download::{ArtifactRetriever, CollisionPolicy};
use crate::error::{SubmissionError, ValidationError};
use crate::generator::{self, JobReport, JobRequest, JobResult, JobSpec, Pipeline, RunOptions};
use crate::naming::OutputName;
use crate::params::{AspectRatio, ExtensionParams, GenerationParams, Mode, Model, VideoDuration};
use crate::prompts::{PromptList, parse_indices};
use crate::task::{Job, OperationKind};
use crate::{logi, logok, logw};

const PREVIEW_CHARS: usize = 200;

#[derive(Parser, Debug)]
#[command(name = "kling-video")]
#[command(author, version, about = "Generate or extend videos with the Kling API")]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log state changes while monitoring, not every status check
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// JSON config file
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Access key (overrides KLING_ACCESS_KEY)
    #[arg(long, global = true)]
    pub access_key: Option<String>,

    /// Secret key (overrides KLING_SECRET)
    #[arg(long, global = true)]
    pub secret_key: Option<String>,

    /// Directory downloaded videos are written to
    #[arg(long, global = true, value_name = "DIR")]
    pub results_dir: Option<PathBuf>,

    /// Seconds between status checks
    #[arg(long, global = true, value_name = "SECS")]
    pub check_interval: Option<u64>,

    /// Maximum seconds to wait for a task
    #[arg(long, global = true, value_name = "SECS")]
    pub max_wait: Option<u64>,

    /// Consecutive failed status checks tolerated before giving up on a task
    #[arg(long, global = true, value_name = "N")]
    pub max_transient_errors: Option<u32>,

    /// Submit only; print task ids instead of waiting for the videos
    #[arg(long, global = true)]
    pub no_monitor: bool,

    /// Keep existing output files instead of replacing them
    #[arg(long, global = true)]
    pub skip_existing: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate new videos from prompts
    Generate {
        /// JSON file containing a list of {"prompt": "..."} objects
        prompt_file: PathBuf,

        /// Comma-separated prompt indices; each argument is one video job
        #[arg(required = true, value_name = "INDICES")]
        groups: Vec<String>,

        #[arg(long, default_value = "kling-v2-master")]
        model: Model,

        #[arg(long, default_value = "9:16")]
        aspect_ratio: AspectRatio,

        /// std or pro
        #[arg(long, default_value = "std")]
        mode: Mode,

        /// Video duration in seconds
        #[arg(long, default_value = "10")]
        duration: VideoDuration,
    },

    /// Extend an existing video
    Extend {
        /// ID of the video to extend
        video_id: String,

        /// JSON prompt file for the extension
        prompt_file: Option<PathBuf>,

        /// Comma-separated prompt indices
        indices: Option<String>,
    },

    /// Check the status of a task once
    Status {
        task_id: String,

        /// The task is a video extension
        #[arg(long)]
        extension: bool,
    },
}

async fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut cfg = match &cli.config {
        Some(path) => Config::load(path).await?,
        None => Config::default(),
    };
    cfg.apply_env();

    if let Some(v) = &cli.access_key {
        cfg.access_key = v.clone();
    }
    if let Some(v) = &cli.secret_key {
        cfg.secret_key = v.clone();
    }
    if let Some(v) = &cli.results_dir {
        cfg.results_dir = v.clone();
    }
    if let Some(v) = cli.check_interval {
        cfg.poll.check_interval_secs = v;
    }
    if let Some(v) = cli.max_wait {
        cfg.poll.max_wait_secs = v;
    }
    if let Some(v) = cli.max_transient_errors {
        cfg.poll.max_transient_errors = v;
    }
    if cli.quiet {
        cfg.poll.verbose = false;
    }
    if cli.skip_existing {
        cfg.collision = CollisionPolicy::Skip;
    }

    cfg.validate()?;
    Ok(cfg)
}

fn describe_selection(indices: &[usize], prompt: &str) {
    logi(format!("Selected indices: {:?}", indices));
    logi(format!("Prompt length: {} characters", prompt.chars().count()));
    let preview: String = prompt.chars().take(PREVIEW_CHARS).collect();
    logi(format!("Prompt preview: {}...", preview));
}

/// A job ready to run, or the report of one rejected while it was being planned.
type Planned = std::result::Result<JobSpec, JobReport>;

fn rejected(label: String, err: ValidationError) -> JobReport {
    logw(format!("[{}] not submitted: {}", label, err));
    JobReport {
        label,
        job: None,
        result: JobResult::Rejected(SubmissionError::Validation(err)),
    }
}

fn plan_group(
    prompts: &PromptList,
    group: &str,
    template: &GenerationParams,
) -> std::result::Result<(Vec<usize>, GenerationParams), ValidationError> {
    let indices = parse_indices(group)?;
    let prompt = prompts.select(&indices);
    if prompt.is_empty() {
        return Err(ValidationError::NoPromptsSelected);
    }
    describe_selection(&indices, &prompt);

    let params = GenerationParams {
        prompt,
        ..template.clone()
    };
    params.validate()?;
    Ok((indices, params))
}

/// One planned job per index group. A bad group is rejected on its own and
/// does not stop the others.
async fn generation_specs(
    prompt_file: &Path,
    groups: &[String],
    template: &GenerationParams,
) -> Result<Vec<Planned>> {
    let prompts = PromptList::load(prompt_file).await?;
    logi(format!(
        "Loaded {} prompts from {}",
        prompts.len(),
        prompt_file.display()
    ));

    let mut plans = Vec::with_capacity(groups.len());
    for group in groups {
        let label = format!("creation {}", group);
        match plan_group(&prompts, group, template) {
            Ok((indices, params)) => plans.push(Ok(JobSpec {
                label,
                request: JobRequest::Create(params),
                output: OutputName::for_creation(prompt_file, &indices)?,
            })),
            Err(err) => plans.push(Err(rejected(label, err))),
        }
    }
    Ok(plans)
}

async fn extension_spec(
    video_id: &str,
    prompt_file: Option<&Path>,
    indices: Option<&str>,
) -> Result<JobSpec> {
    let (prompt, output) = match (prompt_file, indices) {
        (Some(file), Some(indices)) => {
            let indices = parse_indices(indices)?;
            let prompts = PromptList::load(file).await?;
            logi(format!("Loaded {} prompts from {}", prompts.len(), file.display()));
            let prompt = prompts.select(&indices);
            if prompt.is_empty() {
                logw("No usable prompt selected; extending without one.");
            } else {
                describe_selection(&indices, &prompt);
            }
            let output = OutputName::for_extension(video_id, Some((file, indices.as_slice())))?;
            (Some(prompt), output)
        }
        (None, None) => (None, OutputName::for_extension(video_id, None)?),
        _ => bail!("both PROMPT_FILE and INDICES are needed to extend with a prompt"),
    };

    let params = ExtensionParams::new(video_id, prompt);
    params.validate()?;
    if params.prompt.is_none() {
        logi("Extending video without additional prompt");
    }

    Ok(JobSpec {
        label: format!("extension {}", video_id),
        request: JobRequest::Extend(params),
        output,
    })
}

async fn check_status(client: &KlingClient, task_id: &str, extension: bool) -> Result<i32> {
    let kind = if extension {
        OperationKind::Extension
    } else {
        OperationKind::Creation
    };
    let job = Job::new(task_id, kind);
    let snapshot = client
        .probe(&job)
        .await
        .with_context(|| format!("status check for task {} failed", task_id))?;

    logi(format!("Task {}: {}", snapshot.task_id, snapshot.state));
    if let Some(message) = &snapshot.message {
        logi(format!("Message: {}", message));
    }
    for (i, video) in snapshot.artifacts.iter().enumerate() {
        logok(format!(
            "Video {}: id={} duration={}s url={}",
            i + 1,
            video.id,
            video.duration.as_deref().unwrap_or("N/A"),
            video.url
        ));
    }
    Ok(0)
}

/// Runs the parsed command; returns the process exit code.
pub async fn run(cli: Cli, cancel: CancellationToken) -> Result<i32> {
    let cfg = resolve_config(&cli).await?;
    let client = KlingClient::new(&cfg)?;

    let planned = match &cli.command {
        Commands::Status { task_id, extension } => {
            return check_status(&client, task_id, *extension).await;
        }
        Commands::Generate {
            prompt_file,
            groups,
            model,
            aspect_ratio,
            mode,
            duration,
        } => {
            let template = GenerationParams {
                prompt: String::new(),
                model: *model,
                aspect_ratio: *aspect_ratio,
                mode: *mode,
                duration: *duration,
            };
            generation_specs(prompt_file, groups, &template).await?
        }
        Commands::Extend {
            video_id,
            prompt_file,
            indices,
        } => vec![Ok(
            extension_spec(video_id, prompt_file.as_deref(), indices.as_deref()).await?,
        )],
    };

    // Downloads can take far longer than an API call, so they get their own client.
    let download_client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build download client")?;
    let retriever = ArtifactRetriever::new(download_client, cfg.collision);

    let options = RunOptions {
        results_dir: cfg.results_dir.clone(),
        poll: cfg.poll.clone(),
        monitor: !cli.no_monitor,
    };
    let pipeline = Pipeline::new(Arc::new(client), retriever, options);

    let mut slots = Vec::with_capacity(planned.len());
    let mut specs = Vec::new();
    for plan in planned {
        match plan {
            Ok(spec) => {
                specs.push(spec);
                slots.push(None);
            }
            Err(report) => slots.push(Some(report)),
        }
    }
    let mut ran = pipeline.run_batch(specs, &cancel).await.into_iter();
    let reports: Vec<JobReport> = slots
        .into_iter()
        .filter_map(|slot| slot.or_else(|| ran.next()))
        .collect();
    Ok(generator::summarize(&reports))
}
