use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::SolveError;
use crate::game::HandState;
use crate::report::StrategyReport;

/// The shape the range solver consumes. Hole cards are dropped: the solve is
/// range against range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SolverInput {
    pub effective_stack: u32,
    pub pot_before_flop: u32,
    pub preflop_action: String,
    pub flop_cards: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flop_bet: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_card: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_bet: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub river_card: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub river_bet: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_pot: Option<u32>,
}

impl From<&HandState> for SolverInput {
    fn from(state: &HandState) -> Self {
        Self {
            effective_stack: state.effective_stack,
            pot_before_flop: state.pot_before_flop,
            preflop_action: state.preflop_action.join(","),
            flop_cards: state.flop_compact(),
            flop_bet: state.flop_bet,
            turn_card: state.turn_card.map(|card| card.to_string()),
            turn_bet: state.turn_bet,
            river_card: state.river_card.map(|card| card.to_string()),
            river_bet: state.river_bet,
            final_pot: state.final_pot,
        }
    }
}

/// An opaque equity/range solver. Given a well-formed input it returns a
/// mapping keyed `Hero`, `Villain`, `Hero Equity Buckets`,
/// `Villain Equity Buckets` and `Legal Actions`.
///
/// The returned future may be dropped when the solve budget runs out, so an
/// implementation must stop its work on drop. In-process solvers that burn
/// CPU belong on `spawn_blocking` inside the implementation.
#[async_trait]
pub trait SolvingCapability: Send + Sync {
    async fn solve(&self, input: &SolverInput) -> Result<Map<String, Value>>;
}

#[derive(Clone)]
pub struct SolverGateway {
    capability: Arc<dyn SolvingCapability>,
}

impl SolverGateway {
    pub fn new(capability: Arc<dyn SolvingCapability>) -> Self {
        Self { capability }
    }

    pub async fn solve(&self, state: &HandState) -> Result<StrategyReport, SolveError> {
        let input = SolverInput::from(state);
        debug!(?input, "invoking solver");
        let output = self
            .capability
            .solve(&input)
            .await
            .map_err(|cause| SolveError::Invocation { cause })?;
        let report = StrategyReport::from_solver_output(&output)?;
        info!(
            hero_combos = report.hero.len(),
            villain_combos = report.villain.len(),
            "solver returned a report"
        );
        Ok(report)
    }
}

/// Runs an external solver program: the input goes to its stdin as JSON and
/// the result mapping is read back from stdout. The child is killed if the
/// solve is abandoned before it exits.
#[derive(Debug, Clone)]
pub struct ProcessSolver {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessSolver {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl SolvingCapability for ProcessSolver {
    async fn solve(&self, input: &SolverInput) -> Result<Map<String, Value>> {
        let payload = serde_json::to_vec(input).context("failed to encode solver input")?;
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start solver {}", self.program.display()))?;

        let stdin = child.stdin.take();
        let feed = async move {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            stdin.write_all(&payload).await?;
            stdin.shutdown().await
        };
        // Feed and drain together so a solver that stops reading or fills its
        // stdout pipe cannot stall either side, and the child is always reaped.
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.context("failed to collect solver output")?;
        if !output.status.success() {
            bail!(
                "solver exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        if let Err(err) = fed {
            warn!(error = %err, "solver closed its input early");
        }

        serde_json::from_slice(&output.stdout).context("solver did not print a JSON object")
    }
}
