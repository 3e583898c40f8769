//! # Report Synthesizer
//!
//! Drives the model through the two-pass report protocol:
//!
//! 1. initial report from the research summary
//! 2. gap analysis of that report
//! 3. three follow-up questions from the gaps
//! 4. (the pipeline researches each question)
//! 5. enhanced report that folds the answers back in
//!
//! Each step takes the previous step's output type, so the stages cannot be
//! skipped or reordered. A model failure stops the protocol with a
//! [`SynthesisError`] whose text becomes the report.

use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

use crate::collector::{DebugArtifacts, Research, ResearchBatch};
use crate::error::ModelError;
use crate::llm::ModelClient;
use crate::tools::truncate_chars;

/// Characters of each follow-up source quoted in the enhancement prompt.
const FOLLOWUP_EXCERPT_CHARS: usize = 1000;

// =============================================================================
// STAGE TYPES
// =============================================================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftStage {
    Initial,
    Enhanced,
}

/// Markdown report text at one stage. Later stages build a new draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportDraft {
    stage: DraftStage,
    markdown: String,
}

impl ReportDraft {
    pub fn new(stage: DraftStage, markdown: impl Into<String>) -> Self {
        Self {
            stage,
            markdown: markdown.into(),
        }
    }

    pub fn stage(&self) -> DraftStage {
        self.stage
    }

    pub fn markdown(&self) -> &str {
        &self.markdown
    }
}

/// Missing-information items named by the model, one per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gaps(pub Vec<String>);

/// The model's raw follow-up question text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowupQuestions {
    raw: String,
}

impl FollowupQuestions {
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Every non-blank line is a query of its own.
    pub fn queries(&self) -> Vec<String> {
        non_blank_lines(&self.raw)
    }
}

/// A follow-up question together with the research gathered for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowupItem {
    pub question: String,
    pub data: ResearchBatch,
}

// =============================================================================
// ERRORS
// =============================================================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisStep {
    InitialReport,
    GapAnalysis,
    FollowupQuestions,
    Enhancement,
}

impl SynthesisStep {
    fn failure_prefix(self) -> &'static str {
        match self {
            Self::InitialReport => "Error generating initial report",
            Self::GapAnalysis => "Error identifying information gaps",
            Self::FollowupQuestions => "Error generating follow-up questions",
            Self::Enhancement => "Error enhancing report",
        }
    }
}

/// A model failure at one step. Its display text is what ends up in the
/// report when the protocol cannot finish.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}: {source}", .step.failure_prefix())]
pub struct SynthesisError {
    pub step: SynthesisStep,
    pub source: ModelError,
}

impl SynthesisError {
    /// Turn the failure into the draft that replaces the report.
    pub fn into_draft(self) -> ReportDraft {
        let stage = match self.step {
            SynthesisStep::Enhancement => DraftStage::Enhanced,
            _ => DraftStage::Initial,
        };
        ReportDraft::new(stage, self.to_string())
    }
}

// =============================================================================
// SYNTHESIZER
// =============================================================================
pub struct ReportSynthesizer {
    model: Arc<dyn ModelClient>,
    artifacts: DebugArtifacts,
    max_tokens: u64,
}

impl ReportSynthesizer {
    pub fn new(model: Arc<dyn ModelClient>, artifacts: DebugArtifacts, max_tokens: u64) -> Self {
        Self {
            model,
            artifacts,
            max_tokens,
        }
    }

    /// Stage 1: write the first complete report from the research summary.
    pub async fn initial_report(
        &self,
        topic: &str,
        research: &Research,
    ) -> Result<ReportDraft, SynthesisError> {
        info!(topic = %topic, sources = research.source_count(), "Generating initial report");

        let prompt = initial_report_prompt(topic, &research_summary(topic, research));
        let markdown = self.ask(SynthesisStep::InitialReport, &prompt).await?;

        info!("Initial report generation completed");
        Ok(ReportDraft::new(DraftStage::Initial, markdown))
    }

    /// Stage 2: ask the model where the initial report is thin.
    pub async fn identify_gaps(&self, draft: &ReportDraft) -> Result<Gaps, SynthesisError> {
        info!("Identifying information gaps");

        let reply = self
            .ask(SynthesisStep::GapAnalysis, &gap_analysis_prompt(draft.markdown()))
            .await?;
        let gaps = Gaps(non_blank_lines(&reply));

        info!(gaps = gaps.0.len(), "Gap analysis completed");
        Ok(gaps)
    }

    /// Stage 3: turn the gaps into three follow-up questions.
    pub async fn followup_questions(&self, gaps: &Gaps) -> Result<FollowupQuestions, SynthesisError> {
        info!("Generating follow-up questions");

        let raw = self
            .ask(SynthesisStep::FollowupQuestions, &followup_prompt(gaps))
            .await?;
        self.artifacts.write_questions(&raw);

        info!("Follow-up questions generated");
        Ok(FollowupQuestions { raw })
    }

    /// Stage 5: fold the follow-up research into the initial report.
    pub async fn enhance(
        &self,
        initial: &ReportDraft,
        questions: &FollowupQuestions,
        followups: &[FollowupItem],
    ) -> Result<ReportDraft, SynthesisError> {
        info!(followups = followups.len(), "Enhancing report with follow-up research");

        let prompt = enhancement_prompt(initial.markdown(), questions.raw(), followups);
        let markdown = self.ask(SynthesisStep::Enhancement, &prompt).await?;

        info!("Report enhancement completed");
        Ok(ReportDraft::new(DraftStage::Enhanced, markdown))
    }

    async fn ask(&self, step: SynthesisStep, prompt: &str) -> Result<String, SynthesisError> {
        match self.model.generate(prompt, self.max_tokens).await {
            Ok(response) => Ok(response.content),
            Err(source) => {
                let err = SynthesisError { step, source };
                error!(error = %err, "Model call failed");
                Err(err)
            }
        }
    }
}

// =============================================================================
// PROMPTS
// =============================================================================
/// Render every query's sources into the Markdown summary fed to stage 1.
pub fn research_summary(topic: &str, research: &Research) -> String {
    let mut summary = format!("# Research Summary for: {topic}\n\n");

    for (query, batch) in research.iter() {
        summary.push_str(&format!("## Query: {query}\n\n"));
        if batch.is_empty() {
            summary.push_str("No sources were found for this query.\n\n---\n\n");
            continue;
        }

        for record in batch {
            summary.push_str(&format!("### Source: {}\n\n", record.url()));
            match record.error() {
                Some(error) => summary.push_str(&format!("Error: {error}\n\n")),
                None => {
                    summary.push_str(&format!("Title: {}\n\n", record.title()));
                    summary.push_str(&format!("Content Excerpt:\n{}\n\n", record.content()));
                }
            }
            summary.push_str("---\n\n");
        }
    }

    summary
}

fn initial_report_prompt(topic: &str, summary: &str) -> String {
    format!(
        r#"Using the following research summary, generate a comprehensive report on "{topic}":

{summary}

The report should include:
1. An introduction to the topic
2. Key findings from the research
3. Analysis of the main points discovered
4. Comparison of information from different sources (if applicable)
5. Potential implications or applications of the findings
6. Conclusion
7. Areas for further research

Format the report using Markdown syntax. Choose your own section headers, and use lists and emphasis where they help.
Include a table of contents at the beginning.
Include specific examples, names, dates, and places where relevant."#
    )
}

fn gap_analysis_prompt(report: &str) -> String {
    format!(
        r#"Review the following report and identify 3 to 5 concrete information gaps: places where specific examples, dates, figures, people, places, or comparisons are missing or too vague.

{report}

Return one gap per line, as a short description. Do not add any other commentary."#
    )
}

fn followup_prompt(gaps: &Gaps) -> String {
    format!(
        r#"A research report has the following information gaps:

{}

Write exactly 3 follow-up questions that, once researched on the web, would fill these gaps with specific information, examples, or details.

Return only the questions, one per line, numbered 1. to 3., without any additional comments or meta-information."#,
        gaps.0.join("\n")
    )
}

fn enhancement_prompt(initial: &str, questions: &str, followups: &[FollowupItem]) -> String {
    format!(
        r#"Enhance the following initial report by addressing these follow-up questions and incorporating the additional research data:

Initial Report:
{initial}

Follow-up Questions:
{questions}

Additional Research Data:
{}

Incorporate answers to these questions into the relevant sections of the report, adding specific examples, data, and detailed explanations where possible. Use the additional research data to provide more in-depth answers and insights. Keep the overall structure and formatting of the initial report, but expand sections or add new subsections as needed. Return just the enhanced report, with no meta-comments."#,
        format_followup_research(followups)
    )
}

/// Format the follow-up research for the enhancement prompt. Excerpts are
/// truncated to keep the prompt within the model's context.
pub fn format_followup_research(followups: &[FollowupItem]) -> String {
    let mut formatted = String::new();

    for item in followups {
        formatted.push_str(&format!("Question: {}\n", item.question));
        if item.data.is_empty() {
            formatted.push_str("No sources found.\n");
        }
        for record in &item.data {
            formatted.push_str(&format!("Source: {}\n", record.url()));
            match record.error() {
                Some(error) => formatted.push_str(&format!("Error: {error}\n")),
                None => formatted.push_str(&format!(
                    "Content Excerpt:\n- {}\n",
                    truncate_chars(record.content(), FOLLOWUP_EXCERPT_CHARS)
                )),
            }
        }
        formatted.push('\n');
    }

    formatted
}

fn non_blank_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
