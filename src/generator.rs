//! Job pipeline: submit, monitor, download. Batches run their jobs
//! concurrently and always report every job, whatever happened to the others.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::api::VideoService;
use crate::download::{ArtifactReport, ArtifactRetriever, Retrieved};
use crate::error::{PollError, SubmissionError};
use crate::naming::OutputName;
use crate::params::{ExtensionParams, GenerationParams};
use crate::poller::{PollSettings, wait_for_completion};
use crate::task::{Job, PollOutcome};
use crate::{logi, logok, logw};

#[derive(Debug, Clone)]
pub enum JobRequest {
    Create(GenerationParams),
    Extend(ExtensionParams),
}

#[derive(Debug, Clone)]
pub struct JobSpec {
    /// Human-readable name used in logs and the summary.
    pub label: String,
    pub request: JobRequest,
    pub output: OutputName,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub results_dir: PathBuf,
    pub poll: PollSettings,
    /// When false, jobs are only submitted; their task ids are reported for later checks.
    pub monitor: bool,
}

#[derive(Debug)]
pub enum JobResult {
    Rejected(SubmissionError),
    Submitted,
    Aborted(PollError),
    Crashed(String),
    Finished {
        outcome: PollOutcome,
        downloads: Vec<ArtifactReport>,
    },
}

#[derive(Debug)]
pub struct JobReport {
    pub label: String,
    pub job: Option<Job>,
    pub result: JobResult,
}

impl JobReport {
    /// True when the task succeeded and every one of its videos is on disk,
    /// or when it was only submitted.
    pub fn is_success(&self) -> bool {
        match &self.result {
            JobResult::Submitted => true,
            JobResult::Finished { outcome, downloads } => {
                outcome.is_success()
                    && !downloads.is_empty()
                    && downloads.iter().all(|d| d.result.is_ok())
            }
            JobResult::Rejected(_) | JobResult::Aborted(_) | JobResult::Crashed(_) => false,
        }
    }
}

#[derive(Clone)]
pub struct Pipeline {
    service: Arc<dyn VideoService>,
    retriever: ArtifactRetriever,
    options: RunOptions,
}

impl Pipeline {
    pub fn new(
        service: Arc<dyn VideoService>,
        retriever: ArtifactRetriever,
        options: RunOptions,
    ) -> Self {
        Self {
            service,
            retriever,
            options,
        }
    }

    async fn submit(&self, request: &JobRequest) -> Result<Job, SubmissionError> {
        match request {
            JobRequest::Create(params) => self.service.submit_creation(params).await,
            JobRequest::Extend(params) => self.service.submit_extension(params).await,
        }
    }

    pub async fn run_job(&self, spec: JobSpec, cancel: &CancellationToken) -> JobReport {
        self.run_tracked(spec, cancel, &Mutex::new(None)).await
    }

    /// Like `run_job`, but records the accepted job in `submitted` as soon as
    /// it exists so a crashed run can still name its task.
    async fn run_tracked(
        &self,
        spec: JobSpec,
        cancel: &CancellationToken,
        submitted: &Mutex<Option<Job>>,
    ) -> JobReport {
        let JobSpec {
            label,
            request,
            output,
        } = spec;

        let job = match self.submit(&request).await {
            Ok(job) => job,
            Err(err) => {
                logw(format!("[{}] submission failed: {}", label, err));
                return JobReport {
                    label,
                    job: None,
                    result: JobResult::Rejected(err),
                };
            }
        };
        logok(format!(
            "[{}] {} submitted, task id {}",
            label, job.kind, job.id
        ));
        *submitted.lock().unwrap_or_else(|e| e.into_inner()) = Some(job.clone());

        if !self.options.monitor {
            logi(format!("[{}] to check status later, use task id {}", label, job.id));
            return JobReport {
                label,
                job: Some(job),
                result: JobResult::Submitted,
            };
        }

        let outcome =
            match wait_for_completion(self.service.as_ref(), &job, &self.options.poll, cancel).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    logw(format!("[{}] monitoring aborted: {}", label, err));
                    return JobReport {
                        label,
                        job: Some(job),
                        result: JobResult::Aborted(err),
                    };
                }
            };

        let artifacts = outcome.artifacts().to_vec();
        if !outcome.is_success() {
            logw(format!("[{}] video {} {}", label, job.kind, outcome));
        } else if artifacts.is_empty() {
            logw(format!("[{}] task finished but returned no videos", label));
        } else {
            logok(format!("[{}] {}", label, outcome));
        }

        let total = artifacts.len();
        let items = artifacts
            .into_iter()
            .enumerate()
            .map(|(idx, artifact)| {
                let dest = output.destination(&self.options.results_dir, idx, total);
                (artifact, dest)
            })
            .collect();
        let downloads = self.retriever.retrieve_all(items, cancel).await;

        for report in &downloads {
            match &report.result {
                Ok(Retrieved::Written { path, bytes }) => {
                    logok(format!("[{}] video saved: {} ({} bytes)", label, path.display(), bytes))
                }
                Ok(Retrieved::Skipped { path }) => {
                    logi(format!("[{}] kept existing {}", label, path.display()))
                }
                Err(err) => logw(format!(
                    "[{}] download of video {} failed: {}",
                    label, report.artifact.id, err
                )),
            }
        }

        JobReport {
            label,
            job: Some(job),
            result: JobResult::Finished { outcome, downloads },
        }
    }

    /// Runs every job concurrently; reports come back in input order.
    pub async fn run_batch(&self, specs: Vec<JobSpec>, cancel: &CancellationToken) -> Vec<JobReport> {
        let mut handles = Vec::with_capacity(specs.len());
        for spec in specs {
            let label = spec.label.clone();
            let submitted = Arc::new(Mutex::new(None));
            let pipeline = self.clone();
            let cancel = cancel.clone();
            let slot = submitted.clone();
            let handle =
                tokio::spawn(async move { pipeline.run_tracked(spec, &cancel, &slot).await });
            handles.push((label, submitted, handle));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for (label, submitted, handle) in handles {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(err) => {
                    let job = submitted.lock().unwrap_or_else(|e| e.into_inner()).take();
                    match &job {
                        Some(job) => logw(format!(
                            "[{}] job task panicked after submitting task {}: {}",
                            label, job.id, err
                        )),
                        None => logw(format!("[{}] job task panicked: {}", label, err)),
                    }
                    reports.push(JobReport {
                        label,
                        job,
                        result: JobResult::Crashed(err.to_string()),
                    });
                }
            }
        }
        reports
    }
}

/// Logs one line per job and returns the process exit code.
pub fn summarize(reports: &[JobReport]) -> i32 {
    let mut ok = 0usize;
    for report in reports {
        let task = report
            .job
            .as_ref()
            .map(|j| j.id.as_str())
            .unwrap_or("-");
        let line = match &report.result {
            JobResult::Rejected(err) => format!("rejected: {}", err),
            JobResult::Submitted => "submitted".to_string(),
            JobResult::Aborted(err) => format!("aborted: {}", err),
            JobResult::Crashed(reason) => format!("crashed: {}", reason),
            JobResult::Finished { outcome, downloads } => {
                let saved = downloads.iter().filter(|d| d.result.is_ok()).count();
                format!("{}; {}/{} video(s) saved", outcome, saved, downloads.len())
            }
        };
        if report.is_success() {
            ok += 1;
            logok(format!("{} (task {}): {}", report.label, task, line));
        } else {
            logw(format!("{} (task {}): {}", report.label, task, line));
        }
    }
    logi(format!("All done. {}/{} job(s) succeeded", ok, reports.len()));

    if ok == reports.len() { 0 } else { 1 }
}
