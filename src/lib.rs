pub mod cards;
pub mod config;
pub mod error;
pub mod explain;
pub mod game;
pub mod llm;
pub mod normalize;
pub mod pipeline;
pub mod render;
pub mod report;
pub mod response;
pub mod solver;
pub mod vision;
pub mod web;

pub use config::PipelineConfig;
pub use error::{
    CompositionError, FormatError, InvalidValue, ParseError, SolveError, TimeoutError,
    ValidationError,
};
pub use explain::{ExplanationComposer, ExplanationModel, ExplanationNode};
pub use game::{AnalysisMode, HandState};
pub use normalize::{GameStateNormalizer, Normalized};
pub use pipeline::{AnalysisRequest, Pipeline, PipelineError, PipelineOutput, Stage};
pub use report::StrategyReport;
pub use solver::{SolverGateway, SolverInput, SolvingCapability};
pub use vision::{ImagePayload, VisionExtractor};
