use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use gto_explainer::llm::OpenAiClient;
use gto_explainer::normalize::{GameStateNormalizer, Normalized};
use gto_explainer::render::Renderer;
use gto_explainer::solver::ProcessSolver;
use gto_explainer::web;
use gto_explainer::{AnalysisMode, AnalysisRequest, ImagePayload, Pipeline, PipelineConfig};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "gto-explainer",
    version,
    about = "Solver-backed, model-explained poker spot analysis",
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Validate hand fields and print the normalized state (no network)
    Normalize {
        /// JSON object of field name -> value
        #[arg(long)]
        fields: PathBuf,

        #[arg(long, value_enum, default_value = "game")]
        mode: ModeArg,

        #[command(flatten)]
        setup: Setup,
    },
    /// Run the full pipeline on a hand or a screenshot
    Analyze {
        /// JSON object of field name -> value
        #[arg(long)]
        fields: Option<PathBuf>,

        /// Table or solver screenshot
        #[arg(long)]
        image: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "game")]
        mode: ModeArg,

        /// Stop after solving and print the report
        #[arg(long, default_value_t = false)]
        raw: bool,

        /// Print the result as JSON
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Disable ANSI colors in CLI output
        #[arg(long = "no-color", default_value_t = false)]
        no_color: bool,

        #[command(flatten)]
        setup: Setup,
    },
    /// Run the web server
    Serve {
        /// Address to bind (HOST:PORT)
        #[arg(long, default_value = "0.0.0.0:8080")]
        addr: String,

        #[command(flatten)]
        setup: Setup,
    },
}

#[derive(Debug, Args)]
struct Setup {
    /// Pipeline config (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Solver program; overrides the config file
    #[arg(long)]
    solver: Option<PathBuf>,

    /// Extra solver argument (repeatable)
    #[arg(long = "solver-arg")]
    solver_args: Vec<String>,
}

#[derive(Debug, Clone, ValueEnum)]
enum ModeArg {
    Game,
    Gto,
}

impl From<ModeArg> for AnalysisMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Game => AnalysisMode::Game,
            ModeArg::Gto => AnalysisMode::Gto,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = color_eyre::install();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Normalize {
            fields,
            mode,
            setup,
        } => run_normalize(&fields, mode.into(), &setup),
        Commands::Analyze {
            fields,
            image,
            mode,
            raw,
            json,
            no_color,
            setup,
        } => {
            let fields = match fields {
                Some(path) => read_fields(&path)?,
                None => BTreeMap::new(),
            };
            let image = image.as_deref().map(read_image).transpose()?;
            let mut request = AnalysisRequest::new(mode.into(), image, fields);
            if raw {
                request = request.unexplained();
            }
            run_analyze(request, &setup, json, no_color).await
        }
        Commands::Serve { addr, setup } => run_server(addr, &setup).await,
    }
}

fn run_normalize(path: &Path, mode: AnalysisMode, setup: &Setup) -> Result<()> {
    let config = load_config(setup)?;
    let normalizer = GameStateNormalizer::new(config.defaults);
    let fields = read_fields(path)?;
    match normalizer.normalize(&fields, mode)? {
        Normalized::Ready(state) => println!("{}", serde_json::to_string_pretty(&state)?),
        Normalized::Deferred { image_ref } => println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "status": "deferred",
                "image": image_ref,
            }))?
        ),
    }
    Ok(())
}

async fn run_analyze(
    request: AnalysisRequest,
    setup: &Setup,
    json: bool,
    no_color: bool,
) -> Result<()> {
    let pipeline = build_pipeline(setup)?;
    let output = pipeline.run(request).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", Renderer::new(no_color).output(&output));
    }
    Ok(())
}

async fn run_server(addr: String, setup: &Setup) -> Result<()> {
    let addr: SocketAddr = addr.parse()?;
    let pipeline = build_pipeline(setup)?;
    web::serve(addr, Arc::new(pipeline)).await
}

fn load_config(setup: &Setup) -> Result<PipelineConfig> {
    let mut config = match &setup.config {
        Some(path) => PipelineConfig::from_path(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(program) = &setup.solver {
        config.solver.program = Some(program.clone());
        config.solver.args = setup.solver_args.clone();
    }
    Ok(config)
}

fn build_pipeline(setup: &Setup) -> Result<Pipeline> {
    let config = load_config(setup)?;
    let Some(program) = config.solver.program.clone() else {
        bail!("no solver configured; pass --solver or set solver.program in the config");
    };
    let solver = Arc::new(ProcessSolver::new(program, config.solver.args.clone()));
    let model = Arc::new(OpenAiClient::from_env(config.model.clone())?);
    Ok(Pipeline::new(config, solver, model.clone(), model))
}

fn read_fields(path: &Path) -> Result<BTreeMap<String, String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read fields {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("{} must be a JSON object of strings", path.display()))
}

fn read_image(path: &Path) -> Result<ImagePayload> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read image {}", path.display()))?;
    let name = path.display().to_string();
    Ok(ImagePayload::new(bytes, ImagePayload::media_type_for(&name)).named(name))
}
