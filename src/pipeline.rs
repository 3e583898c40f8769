//! # Pipeline Orchestrator
//!
//! Runs one research job end to end:
//!
//! ```text
//! topic ─► collect ─► initial report ─► gaps ─► follow-up questions
//!                                                      │
//!        report.html ◄─ render ◄─ enhanced report ◄─ follow-up research
//! ```
//!
//! Each step is awaited before the next starts. Every model exchange is
//! recorded in a conversation log that is persisted after each entry, and
//! stage progress is reported to a [`PipelineObserver`].

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::collector::{DebugArtifacts, Research, ResearchCollector};
use crate::config::Config;
use crate::conversation::{ConversationLog, ConversationStore, Role};
use crate::error::PersistenceError;
use crate::llm::{ModelClient, RecordingModel};
use crate::render;
use crate::synthesizer::{FollowupItem, ReportDraft, ReportSynthesizer, SynthesisError, SynthesisStep};
use crate::tools::{ContentFetcher, SearchProvider};

// =============================================================================
// STAGES AND OBSERVER
// =============================================================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Research,
    InitialReport,
    GapAnalysis,
    FollowupQuestions,
    FollowupResearch,
    Enhancement,
    Rendering,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Research => "research",
            Self::InitialReport => "initial report",
            Self::GapAnalysis => "gap analysis",
            Self::FollowupQuestions => "follow-up questions",
            Self::FollowupResearch => "follow-up research",
            Self::Enhancement => "enhancement",
            Self::Rendering => "rendering",
        };
        f.write_str(name)
    }
}

impl From<SynthesisStep> for Stage {
    fn from(step: SynthesisStep) -> Self {
        match step {
            SynthesisStep::InitialReport => Self::InitialReport,
            SynthesisStep::GapAnalysis => Self::GapAnalysis,
            SynthesisStep::FollowupQuestions => Self::FollowupQuestions,
            SynthesisStep::Enhancement => Self::Enhancement,
        }
    }
}

/// Receives progress events from a pipeline run.
///
/// # Rust Concept: Trait Objects for Dependency Injection
///
/// The observer is handed to [`Pipeline::new`] as `Arc<dyn PipelineObserver>`
/// instead of being a global, so tests can watch a run without touching the
/// process-wide tracing subscriber.
pub trait PipelineObserver: Send + Sync {
    fn stage_started(&self, stage: Stage);

    fn stage_failed(&self, stage: Stage, error: &str);

    fn completed(&self, artifacts: &Artifacts);
}

/// Forwards pipeline events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn stage_started(&self, stage: Stage) {
        info!(stage = %stage, "Stage started");
    }

    fn stage_failed(&self, stage: Stage, error: &str) {
        error!(stage = %stage, error = %error, "Stage failed, rendering what we have");
    }

    fn completed(&self, artifacts: &Artifacts) {
        info!(
            report = %artifacts.report_path.display(),
            conversation = %artifacts.conversation_path.display(),
            "Research completed"
        );
    }
}

/// Files produced by one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    pub report_path: PathBuf,
    pub conversation_path: PathBuf,
}

// =============================================================================
// PIPELINE
// =============================================================================
pub struct Pipeline {
    config: Config,
    search: Arc<dyn SearchProvider>,
    fetcher: Arc<dyn ContentFetcher>,
    model: Arc<dyn ModelClient>,
    observer: Arc<dyn PipelineObserver>,
}

impl Pipeline {
    pub fn new(
        config: Config,
        search: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn ContentFetcher>,
        model: Arc<dyn ModelClient>,
        observer: Arc<dyn PipelineObserver>,
    ) -> Self {
        Self {
            config,
            search,
            fetcher,
            model,
            observer,
        }
    }

    /// Research `topic` and write the HTML report and the conversation log.
    ///
    /// Search, fetch and model failures never fail the run: they degrade the
    /// report instead. Only failing to persist an artifact is an error.
    pub async fn run(&self, topic: &str) -> Result<Artifacts, PersistenceError> {
        info!(topic = %topic, "Starting research");

        let log = Arc::new(ConversationStore::new(&self.config.debug_dir).open_log(topic)?);
        note(&log, format!("Research topic: {topic}"));

        let debug = DebugArtifacts::new(&self.config.debug_dir);
        debug.reset_results();

        let collector =
            ResearchCollector::new(self.search.clone(), self.fetcher.clone(), debug.clone());
        let recorder = Arc::new(RecordingModel::new(self.model.clone(), log.clone()));
        let synthesizer = ReportSynthesizer::new(recorder, debug, self.config.max_tokens);

        self.observer.stage_started(Stage::Research);
        let research = collector
            .collect(&[topic.to_string()], self.config.max_search_results)
            .await;

        let draft = match self
            .synthesize(topic, &research, &collector, &synthesizer, &log)
            .await
        {
            Ok(draft) => draft,
            Err(e) => {
                let message = e.to_string();
                self.observer.stage_failed(e.step.into(), &message);
                note(&log, format!("Stopped early: {message}"));
                e.into_draft()
            }
        };

        self.observer.stage_started(Stage::Rendering);
        info!(stage = ?draft.stage(), "Rendering final draft");
        let html = render::render(draft.markdown(), &format!("{topic} Research Report"));
        let report_path = self.write_report(topic, &html)?;
        note(&log, format!("Report saved to {}", report_path.display()));

        log.flush()?;
        info!(
            path = %log.path().display(),
            entries = log.entries().len(),
            "Conversation log saved"
        );

        let artifacts = Artifacts {
            report_path,
            conversation_path: log.path().to_path_buf(),
        };
        self.observer.completed(&artifacts);
        Ok(artifacts)
    }

    /// Synthesizer stages 1 to 5. The first model failure ends the sequence.
    async fn synthesize(
        &self,
        topic: &str,
        research: &Research,
        collector: &ResearchCollector,
        synthesizer: &ReportSynthesizer,
        log: &ConversationLog,
    ) -> Result<ReportDraft, SynthesisError> {
        self.enter(log, Stage::InitialReport);
        let initial = synthesizer.initial_report(topic, research).await?;

        self.enter(log, Stage::GapAnalysis);
        let gaps = synthesizer.identify_gaps(&initial).await?;

        self.enter(log, Stage::FollowupQuestions);
        let questions = synthesizer.followup_questions(&gaps).await?;

        self.enter(log, Stage::FollowupResearch);
        let mut followups = Vec::new();
        for question in questions.queries() {
            let data = collector
                .collect_one(&question, self.config.max_search_results)
                .await;
            followups.push(FollowupItem { question, data });
        }

        self.enter(log, Stage::Enhancement);
        synthesizer.enhance(&initial, &questions, &followups).await
    }

    fn enter(&self, log: &ConversationLog, stage: Stage) {
        self.observer.stage_started(stage);
        note(log, format!("Starting {stage}"));
    }

    fn write_report(&self, topic: &str, html: &str) -> Result<PathBuf, PersistenceError> {
        let dir = &self.config.reports_dir;
        fs::create_dir_all(dir).map_err(|e| PersistenceError::io(dir, e))?;

        let path = report_path(dir, topic);
        fs::write(&path, html).map_err(|e| PersistenceError::io(&path, e))?;

        info!(path = %path.display(), "HTML report saved");
        Ok(path)
    }
}

/// Record a `system` entry. The final flush reports a log that cannot be
/// written, so a single failed append is only a warning.
fn note(log: &ConversationLog, message: String) {
    if let Err(e) = log.append(Role::System, message) {
        warn!(error = %e, "Failed to persist conversation entry");
    }
}

/// `<topic>_report.html`, with anything that cannot appear in a file name
/// replaced by `_`.
pub fn report_file_name(topic: &str) -> String {
    let stem: String = topic
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() || c.is_control() => '_',
            c => c,
        })
        .collect();

    format!("{stem}_report.html")
}

/// The report path a run for `topic` writes to.
pub fn report_path(reports_dir: &Path, topic: &str) -> PathBuf {
    reports_dir.join(report_file_name(topic))
}
