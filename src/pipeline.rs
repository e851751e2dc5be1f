//! Request orchestration:
//! `Received -> Normalizing -> (Extracting) -> Solving -> Explaining -> Done`.
//!
//! A [`Pipeline`] holds no per-request state and can be shared behind an
//! `Arc` by any number of concurrent requests.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::{CompositionError, ParseError, SolveError, TimeoutError, ValidationError};
use crate::explain::{
    ExplanationComposer, ExplanationContext, ExplanationModel, ExplanationNode, PromptStyle,
};
use crate::game::{AnalysisMode, HandState};
use crate::normalize::{GAME_FIELDS, GameStateNormalizer, IMAGE, Normalized, fields_from_extraction};
use crate::report::StrategyReport;
use crate::response::{extract_block, parse_structured};
use crate::solver::{SolverGateway, SolvingCapability};
use crate::vision::{EXTRACTION_RETRY_SUFFIX, ImagePayload, VisionExtractor, extraction_prompt};

/// Vision calls per request: one retry after an unreadable answer.
const EXTRACTION_ATTEMPTS: u32 = 2;
/// Explanation calls per request: one retry with the format template.
const EXPLANATION_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Normalizing,
    Extracting,
    Solving,
    Explaining,
    Done,
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Received => "received",
            Stage::Normalizing => "normalizing",
            Stage::Extracting => "extracting",
            Stage::Solving => "solving",
            Stage::Explaining => "explaining",
            Stage::Done => "done",
        })
    }
}

#[derive(Debug, Error)]
pub enum StageFailure {
    #[error(transparent)]
    Normalize(#[from] ValidationError),

    #[error("could not read the response: {0}")]
    Unreadable(ParseError),

    #[error("vision model call failed: {cause:#}")]
    Extraction { cause: anyhow::Error },

    #[error(transparent)]
    Solve(#[from] SolveError),

    #[error(transparent)]
    Composition(#[from] CompositionError),

    #[error(transparent)]
    Timeout(#[from] TimeoutError),
}

#[derive(Debug, Error)]
#[error("{stage} failed: {failure}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub failure: StageFailure,
}

impl PipelineError {
    /// Input problems the user can fix and resubmit.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.failure, StageFailure::Normalize(_))
    }

    pub fn invalid_fields(&self) -> BTreeSet<&'static str> {
        match &self.failure {
            StageFailure::Normalize(err) => err.offending_fields(),
            _ => BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub mode: AnalysisMode,
    pub image: Option<ImagePayload>,
    pub fields: BTreeMap<String, String>,
    /// `false` stops after solving and returns the bare report.
    pub explain: bool,
}

impl AnalysisRequest {
    pub fn new(
        mode: AnalysisMode,
        image: Option<ImagePayload>,
        fields: BTreeMap<String, String>,
    ) -> Self {
        Self {
            mode,
            image,
            fields,
            explain: true,
        }
    }

    pub fn unexplained(mut self) -> Self {
        self.explain = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineOutput {
    Explained {
        state: HandState,
        report: StrategyReport,
        explanation: ExplanationNode,
    },
    Report {
        state: HandState,
        report: StrategyReport,
    },
}

impl PipelineOutput {
    pub fn state(&self) -> &HandState {
        match self {
            PipelineOutput::Explained { state, .. } | PipelineOutput::Report { state, .. } => state,
        }
    }

    pub fn report(&self) -> &StrategyReport {
        match self {
            PipelineOutput::Explained { report, .. } | PipelineOutput::Report { report, .. } => {
                report
            }
        }
    }

    pub fn explanation(&self) -> Option<&ExplanationNode> {
        match self {
            PipelineOutput::Explained { explanation, .. } => Some(explanation),
            PipelineOutput::Report { .. } => None,
        }
    }
}

struct Progress {
    stage: Stage,
}

impl Progress {
    fn advance(&mut self, next: Stage) {
        debug!(from = %self.stage, to = %next, "stage transition");
        self.stage = next;
    }

    fn fail(&self, failure: impl Into<StageFailure>) -> PipelineError {
        let failure = failure.into();
        warn!(stage = %self.stage, error = %failure, "pipeline failed");
        PipelineError {
            stage: self.stage,
            failure,
        }
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    normalizer: GameStateNormalizer,
    solver: SolverGateway,
    vision: Arc<dyn VisionExtractor>,
    composer: ExplanationComposer,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        solver: Arc<dyn SolvingCapability>,
        vision: Arc<dyn VisionExtractor>,
        explainer: Arc<dyn ExplanationModel>,
    ) -> Self {
        Self {
            normalizer: GameStateNormalizer::new(config.defaults.clone()),
            solver: SolverGateway::new(solver),
            vision,
            composer: ExplanationComposer::new(explainer),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn run_pipeline(
        &self,
        mode: AnalysisMode,
        image: Option<ImagePayload>,
        fields: BTreeMap<String, String>,
    ) -> Result<PipelineOutput, PipelineError> {
        self.run(AnalysisRequest::new(mode, image, fields)).await
    }

    pub async fn run(&self, request: AnalysisRequest) -> Result<PipelineOutput, PipelineError> {
        let span = info_span!("pipeline", request_id = %Uuid::new_v4(), mode = %request.mode);
        self.execute(request).instrument(span).await
    }

    async fn execute(&self, request: AnalysisRequest) -> Result<PipelineOutput, PipelineError> {
        let mut progress = Progress {
            stage: Stage::Received,
        };
        info!(
            fields = request.fields.len(),
            image = request.image.is_some(),
            "request received"
        );

        progress.advance(Stage::Normalizing);
        let state = self.resolve_state(&request, &mut progress).await?;

        progress.advance(Stage::Solving);
        let report = self
            .solve(&state)
            .await
            .map_err(|failure| progress.fail(failure))?;

        if !request.explain {
            progress.advance(Stage::Done);
            return Ok(PipelineOutput::Report { state, report });
        }

        progress.advance(Stage::Explaining);
        let explanation = self
            .explain(&state, &report)
            .await
            .map_err(|failure| progress.fail(failure))?;

        progress.advance(Stage::Done);
        Ok(PipelineOutput::Explained {
            state,
            report,
            explanation,
        })
    }

    async fn resolve_state(
        &self,
        request: &AnalysisRequest,
        progress: &mut Progress,
    ) -> Result<HandState, PipelineError> {
        match request.mode {
            AnalysisMode::Game => {
                if has_hand_fields(&request.fields) || request.image.is_none() {
                    return self
                        .normalizer
                        .normalize_manual(&request.fields, request.mode)
                        .map_err(|err| progress.fail(err));
                }
            }
            AnalysisMode::Gto => {
                let mut fields = request.fields.clone();
                if let Some(image) = &request.image {
                    fields
                        .entry(IMAGE.to_string())
                        .or_insert_with(|| image.reference());
                }
                match self.normalizer.normalize(&fields, request.mode) {
                    Ok(Normalized::Ready(state)) => return Ok(state),
                    Ok(Normalized::Deferred { image_ref }) => {
                        debug!(%image_ref, "state deferred to extraction");
                    }
                    Err(err) => return Err(progress.fail(err)),
                }
            }
        }

        let Some(image) = &request.image else {
            return Err(progress.fail(ValidationError::missing([IMAGE])));
        };

        progress.advance(Stage::Extracting);
        let extracted = self
            .extract(image, request.mode)
            .await
            .map_err(|failure| progress.fail(failure))?;

        progress.advance(Stage::Normalizing);
        self.normalizer
            .normalize_extracted(&request.fields, &extracted, request.mode)
            .map_err(|err| progress.fail(err))
    }

    async fn extract(
        &self,
        image: &ImagePayload,
        mode: AnalysisMode,
    ) -> Result<BTreeMap<String, String>, StageFailure> {
        let budget = self.config.timeouts.extraction;
        let base_prompt = extraction_prompt(mode);
        let mut last_error = ParseError::NoFencedBlock;

        for attempt in 1..=EXTRACTION_ATTEMPTS {
            let prompt = if attempt == 1 {
                base_prompt.clone()
            } else {
                format!("{base_prompt}{EXTRACTION_RETRY_SUFFIX}")
            };
            let text = timeout(budget, self.vision.extract(image, &prompt))
                .await
                .map_err(|_| TimeoutError {
                    operation: "vision extraction",
                    budget,
                })?
                .map_err(|cause| StageFailure::Extraction { cause })?;

            match extract_block(&text, Some("json")).and_then(|block| parse_structured(&block)) {
                Ok(object) => {
                    info!(attempt, keys = object.len(), "extraction parsed");
                    return Ok(fields_from_extraction(&object));
                }
                Err(err) => {
                    warn!(attempt, error = %err, "unreadable extraction response");
                    last_error = err;
                }
            }
        }
        Err(StageFailure::Unreadable(last_error))
    }

    async fn solve(&self, state: &HandState) -> Result<StrategyReport, StageFailure> {
        let budget = self.config.timeouts.solve;
        // Dropping the solve future on timeout cancels the capability's work.
        let report = timeout(budget, self.solver.solve(state))
            .await
            .map_err(|_| TimeoutError {
                operation: "solve",
                budget,
            })??;
        Ok(report)
    }

    async fn explain(
        &self,
        state: &HandState,
        report: &StrategyReport,
    ) -> Result<ExplanationNode, StageFailure> {
        let budget = self.config.timeouts.explanation;
        let context = ExplanationContext::from(state);
        let mut attempt = 1;

        loop {
            let style = if attempt == 1 {
                PromptStyle::Plain
            } else {
                PromptStyle::WithTemplate
            };
            let composed = timeout(budget, self.composer.compose(report, &context, style))
                .await
                .map_err(|_| TimeoutError {
                    operation: "explanation",
                    budget,
                })?;
            match composed {
                Ok(node) => return Ok(node),
                Err(err @ (CompositionError::Parse(_) | CompositionError::Model { .. }))
                    if attempt < EXPLANATION_ATTEMPTS =>
                {
                    warn!(attempt, error = %err, "explanation unusable, retrying with template");
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

fn has_hand_fields(fields: &BTreeMap<String, String>) -> bool {
    GAME_FIELDS
        .iter()
        .any(|name| fields.get(*name).is_some_and(|value| !value.trim().is_empty()))
}
