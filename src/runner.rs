use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use governor::{Quota, RateLimiter};
use indicatif::ProgressBar;
use log::{error, info};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task;
use tokio::time::sleep;

use crate::analyzer::Analyzer;
use crate::catalog::{
    default_endpoints, header_templates, Endpoint, EndpointKind, HeaderTemplate,
    ACTIVATION_PATTERNS,
};
use crate::codegen::CodeGenerator;
use crate::dispatcher::{self, ClientBuildError};
use crate::findings::{ArtifactPaths, FindingsStore, RunStats, RunSummary, StoreError};
use crate::identity::Identity;
use crate::mutation;
use crate::payload::{Payload, PayloadBuilder};

#[derive(Clone, Debug)]
pub struct Options {
    pub base_url: String,
    pub proxy: Option<String>,
    pub endpoints: Vec<Endpoint>,
    pub timeout_seconds: u64,
    pub retry_count: u32,
    pub activation_workers: usize,
    pub generic_workers: usize,
    pub pattern_repetitions: u32,
    pub repetition_delay_ms: u64,
    pub submission_rate: u32,
    pub artifacts: ArtifactPaths,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            proxy: None,
            endpoints: default_endpoints(),
            timeout_seconds: 10,
            retry_count: dispatcher::DEFAULT_RETRY_COUNT,
            activation_workers: 3,
            generic_workers: 2,
            pattern_repetitions: 50,
            repetition_delay_ms: 200,
            submission_rate: 2,
            artifacts: ArtifactPaths::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("no base URL provided")]
    NoBaseUrl,

    #[error("invalid base URL: {url}")]
    InvalidBaseUrl { url: String },

    #[error("invalid {pool} worker count, expected positive integer")]
    InvalidWorkerCount { pool: &'static str },

    #[error("invalid pattern repetition count, expected positive integer")]
    InvalidRepetitions,

    #[error("invalid submission rate, expected positive integer")]
    InvalidSubmissionRate,

    #[error(transparent)]
    ClientBuild(#[from] ClientBuildError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("task join failed: {source}")]
    TaskJoin {
        #[source]
        source: tokio::task::JoinError,
    },
}

#[derive(Clone)]
struct ProbeContext {
    client: reqwest::Client,
    base_url: String,
    templates: Arc<Vec<HeaderTemplate>>,
    builder: Arc<PayloadBuilder>,
    analyzer: Arc<Analyzer>,
    retry_count: u32,
    pattern_repetitions: u32,
    repetition_delay: Duration,
    pb: ProgressBar,
}

impl ProbeContext {
    async fn probe(&self, url: &str, payload: &Payload, is_activation: bool) {
        self.pb.inc(1);
        match dispatcher::send_with_retry(
            &self.client,
            url,
            payload,
            &self.templates,
            self.retry_count,
        )
        .await
        {
            Ok(result) => {
                self.analyzer
                    .classify(url, payload, &result, is_activation)
                    .await
            }
            Err(e) => error!("skipping variant for {url}: {e}"),
        }
    }
}

async fn run_activation_worker(mut rx: mpsc::Receiver<Endpoint>, ctx: ProbeContext) {
    while let Some(endpoint) = rx.recv().await {
        let url = format!("{}{}", ctx.base_url, endpoint.path);
        ctx.pb.set_message(format!("activation :: {}", endpoint.path));
        // patterns in catalog order, sequential within this worker
        for pattern in ACTIVATION_PATTERNS {
            for _ in 0..ctx.pattern_repetitions {
                let payload = ctx.builder.build_with_pattern(&endpoint, pattern);
                ctx.probe(&url, &payload, true).await;
                sleep(ctx.repetition_delay).await;
            }
        }
    }
}

async fn run_generic_worker(mut rx: mpsc::Receiver<Endpoint>, ctx: ProbeContext) {
    while let Some(endpoint) = rx.recv().await {
        let url = format!("{}{}", ctx.base_url, endpoint.path);
        ctx.pb.set_message(format!("mutating :: {}", endpoint.path));
        let base = ctx.builder.build_base(&endpoint);
        // the unmutated base goes out first, then one request per variant
        ctx.probe(&url, &base, false).await;
        for variant in mutation::variants(&base) {
            ctx.probe(&url, &variant, false).await;
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Activation,
    Generic,
}

#[derive(Clone, Debug)]
pub struct Runner {
    options: Options,
}

impl Runner {
    pub fn new(options: Options) -> Result<Self, RunnerError> {
        if options.base_url.trim().is_empty() {
            return Err(RunnerError::NoBaseUrl);
        }
        if reqwest::Url::parse(&options.base_url).is_err() {
            return Err(RunnerError::InvalidBaseUrl {
                url: options.base_url.clone(),
            });
        }
        if options.activation_workers == 0 {
            return Err(RunnerError::InvalidWorkerCount { pool: "activation" });
        }
        if options.generic_workers == 0 {
            return Err(RunnerError::InvalidWorkerCount { pool: "generic" });
        }
        if options.pattern_repetitions == 0 {
            return Err(RunnerError::InvalidRepetitions);
        }
        if options.submission_rate == 0 {
            return Err(RunnerError::InvalidSubmissionRate);
        }
        Ok(Self { options })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub async fn run(&self) -> Result<RunSummary, RunnerError> {
        self.run_with_progress(ProgressBar::hidden()).await
    }

    pub async fn run_with_progress(&self, pb: ProgressBar) -> Result<RunSummary, RunnerError> {
        let identity = Identity::detect();
        let codes = Arc::new(CodeGenerator::new());
        let builder = Arc::new(PayloadBuilder::new(identity.clone(), codes));
        let templates = Arc::new(header_templates(&identity));
        let stats = Arc::new(RunStats::new());
        let store = Arc::new(FindingsStore::open(&self.options.artifacts).await?);
        let analyzer = Arc::new(Analyzer::new(store, stats.clone()));

        let activation: Vec<Endpoint> = self
            .options
            .endpoints
            .iter()
            .filter(|e| e.kind == EndpointKind::Activation)
            .cloned()
            .collect();
        let generic: Vec<Endpoint> = self
            .options
            .endpoints
            .iter()
            .filter(|e| e.kind == EndpointKind::Generic)
            .cloned()
            .collect();

        info!(
            "starting probe against {} ({} activation, {} generic endpoints)",
            self.options.base_url,
            activation.len(),
            generic.len()
        );

        // the generic phase never starts before the activation phase drains
        info!("probing activation endpoints");
        self.run_phase(
            Phase::Activation,
            activation,
            self.options.activation_workers,
            &builder,
            &templates,
            &analyzer,
            &pb,
        )
        .await?;

        info!("probing generic endpoints with mutations");
        self.run_phase(
            Phase::Generic,
            generic,
            self.options.generic_workers,
            &builder,
            &templates,
            &analyzer,
            &pb,
        )
        .await?;

        Ok(stats.snapshot())
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_phase(
        &self,
        phase: Phase,
        endpoints: Vec<Endpoint>,
        worker_count: usize,
        builder: &Arc<PayloadBuilder>,
        templates: &Arc<Vec<HeaderTemplate>>,
        analyzer: &Arc<Analyzer>,
        pb: &ProgressBar,
    ) -> Result<(), RunnerError> {
        if endpoints.is_empty() {
            return Ok(());
        }

        let (job_tx, mut job_rx) = mpsc::channel::<Endpoint>(1024);

        let mut worker_job_rxs = Vec::new();
        let mut worker_job_txs = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let (tx, rx) = mpsc::channel::<Endpoint>(1024);
            worker_job_txs.push(tx);
            worker_job_rxs.push(rx);
        }

        let dispatch_handle = tokio::spawn(async move {
            let mut idx = 0usize;
            while let Some(job) = job_rx.recv().await {
                if worker_job_txs.is_empty() {
                    break;
                }
                let tx = worker_job_txs[idx % worker_job_txs.len()].clone();
                let _ = tx.send(job).await;
                idx = idx.wrapping_add(1);
            }
        });

        let submission_rate = self.options.submission_rate;
        let submit_handle = tokio::spawn(async move {
            // the activation phase submits eagerly; the generic phase paces
            // submissions, blocking the submitter rather than the workers
            let lim = match phase {
                Phase::Activation => None,
                Phase::Generic => Some(RateLimiter::direct(Quota::per_second(
                    NonZeroU32::new(submission_rate).unwrap(),
                ))),
            };
            for endpoint in endpoints {
                if let Some(lim) = lim.as_ref() {
                    lim.until_ready().await;
                }
                if job_tx.send(endpoint).await.is_err() {
                    break;
                }
            }
        });

        let mut workers = FuturesUnordered::new();
        for rx in worker_job_rxs {
            let ctx = ProbeContext {
                client: dispatcher::build_client(
                    self.options.proxy.as_deref(),
                    self.options.timeout_seconds,
                )?,
                base_url: self.options.base_url.clone(),
                templates: templates.clone(),
                builder: builder.clone(),
                analyzer: analyzer.clone(),
                retry_count: self.options.retry_count,
                pattern_repetitions: self.options.pattern_repetitions,
                repetition_delay: Duration::from_millis(self.options.repetition_delay_ms),
                pb: pb.clone(),
            };
            workers.push(match phase {
                Phase::Activation => task::spawn(run_activation_worker(rx, ctx)),
                Phase::Generic => task::spawn(run_generic_worker(rx, ctx)),
            });
        }

        submit_handle
            .await
            .map_err(|e| RunnerError::TaskJoin { source: e })?;
        dispatch_handle
            .await
            .map_err(|e| RunnerError::TaskJoin { source: e })?;
        while let Some(joined) = workers.next().await {
            joined.map_err(|e| RunnerError::TaskJoin { source: e })?;
        }

        Ok(())
    }
}
