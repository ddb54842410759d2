use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use graphagent_agent::{
    ExecutionResult, ModelCaller, NodeContext, NodeRegistry, WorkflowRunner, WorkflowSpec,
};
use graphagent_core::config::{AppConfig, MAX_STEPS_LIMIT};
use graphagent_core::traits::LlmClient;

/// Scratch lines shown under a result.
const TRACE_LINES: usize = 5;

#[derive(Parser)]
#[command(
    name = "graphagent",
    version,
    about = "Plan, research, compute and write answers with a node workflow"
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, env = "GRAPHAGENT_CONFIG", default_value = "graphagent.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a single task and exit
    Run {
        /// The task text (read from stdin when omitted)
        #[arg(trailing_var_arg = true)]
        task: Vec<String>,
        /// Pipeline name (defaults to workflow.default_pipeline)
        #[arg(short, long)]
        pipeline: Option<String>,
        /// Override agent.max_steps
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..=MAX_STEPS_LIMIT as u64))]
        max_steps: Option<u64>,
        /// Print the full execution result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Solve tasks read line by line until an empty line or EOF
    Repl {
        #[arg(short, long)]
        pipeline: Option<String>,
    },
    /// Print a pipeline as a plain-text diagram
    Diagram {
        #[arg(short, long)]
        pipeline: Option<String>,
        /// List available pipelines instead
        #[arg(long)]
        list: bool,
    },
    /// Show the effective configuration (secrets redacted)
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("graphagent=info,warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Some(Commands::Completions { shell }) = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "graphagent", &mut io::stdout());
        return Ok(());
    }

    let config = load_config(&cli.config)?;
    let base = cli.config.parent().filter(|p| !p.as_os_str().is_empty());

    match cli.command {
        Some(Commands::Completions { .. }) => unreachable!("handled before config load"),
        Some(Commands::Config) => {
            println!("{}", toml::to_string_pretty(&config.redacted())?);
        }
        Some(Commands::Diagram { pipeline, list }) => {
            let dir = config.pipelines_dir(base);
            if list {
                for name in WorkflowSpec::available(&dir) {
                    println!("{}", name);
                }
                return Ok(());
            }
            let name = pipeline.as_deref().unwrap_or(&config.workflow.default_pipeline);
            let spec = WorkflowSpec::load_named(&dir, name)?;
            warn_unregistered(&spec, &NodeRegistry::with_builtins());
            println!("{}", spec.diagram());
        }
        Some(Commands::Run {
            task,
            pipeline,
            max_steps,
            json,
        }) => {
            let mut text = task.join(" ");
            if text.trim().is_empty() {
                text = io::stdin()
                    .lock()
                    .lines()
                    .map_while(|l| l.ok())
                    .collect::<Vec<_>>()
                    .join("\n");
            }
            if text.trim().is_empty() {
                anyhow::bail!("no task given");
            }

            let engine = Engine::build(
                &config,
                base,
                pipeline.as_deref(),
                max_steps.map(|n| n as usize),
            )?;
            let result = engine.solve(text.trim()).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_result(&result);
            }
        }
        Some(Commands::Repl { pipeline }) => {
            let engine = Engine::build(&config, base, pipeline.as_deref(), None)?;
            run_repl(&engine).await?;
        }
        None => {
            let engine = Engine::build(&config, base, None, None)?;
            run_repl(&engine).await?;
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }
    if path == Path::new("graphagent.toml") {
        info!(path = %path.display(), "No config file found, using defaults");
        return Ok(AppConfig::default());
    }
    anyhow::bail!("config file not found: {}", path.display())
}

/// Everything needed to run tasks: the runner plus the run context.
struct Engine {
    runner: WorkflowRunner,
    ctx: NodeContext,
}

impl Engine {
    fn build(
        config: &AppConfig,
        base: Option<&Path>,
        pipeline: Option<&str>,
        max_steps: Option<usize>,
    ) -> anyhow::Result<Self> {
        let llm: Arc<dyn LlmClient> = Arc::from(graphagent_llm::create_client(&config.model)?);
        let retriever = graphagent_retrieval::create_retriever(&config.retrieval, base)?;

        let name = pipeline.unwrap_or(&config.workflow.default_pipeline);
        let spec = WorkflowSpec::load_named(&config.pipelines_dir(base), name)?;
        let registry = NodeRegistry::with_builtins();
        warn_unregistered(&spec, &registry);

        let runner = WorkflowRunner::new(Arc::new(spec), Arc::new(registry))
            .with_max_steps(max_steps.unwrap_or(config.agent.max_steps));
        let ctx = NodeContext::new(
            ModelCaller::new(llm, &config.model),
            retriever,
            &config.agent,
        );

        info!(
            provider = %config.model.provider,
            model = %config.model.model_id,
            retriever = ctx.retriever.name(),
            pipeline = %name,
            "Engine ready"
        );
        Ok(Self { runner, ctx })
    }

    /// Run one task; Ctrl-C cancels it.
    async fn solve(&self, task: &str) -> ExecutionResult {
        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, finishing current step");
                    cancel.cancel();
                }
            })
        };

        let ctx = self.ctx.clone().with_cancel(cancel);
        let result = self.runner.run(task, &ctx).await;
        watcher.abort();
        result
    }
}

/// Warn about pipeline nodes no behavior is registered for.
fn warn_unregistered(spec: &WorkflowSpec, registry: &NodeRegistry) {
    let mut names = vec![spec.start.as_str()];
    for (from, to) in &spec.edges {
        names.push(from);
        names.extend(to.iter().map(String::as_str));
    }
    names.sort_unstable();
    names.dedup();
    for name in names {
        if !registry.contains(name) && !spec.is_end(name) {
            warn!(pipeline = %spec.name, node = %name, "Pipeline references an unregistered node");
        }
    }
}

fn print_result(result: &ExecutionResult) {
    let state = &result.state;
    println!("{}", state.result);

    if !state.evidence.is_empty() {
        println!("\nEvidence:");
        for (i, line) in state.evidence.iter().enumerate() {
            println!("[{}] {}", i + 1, line);
        }
    }

    println!("\nTrace (last {}):", TRACE_LINES);
    for line in state.tail(TRACE_LINES) {
        println!("{}", line);
    }
    println!(
        "\n[{:?} after {} steps in {}ms]",
        result.termination, state.step, result.total_elapsed_ms
    );
}

async fn run_repl(engine: &Engine) -> anyhow::Result<()> {
    println!("GraphAgent v{}", env!("CARGO_PKG_VERSION"));
    println!("{}", engine.runner.spec().diagram());
    println!("Enter a task per line; an empty line or /quit exits.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break; // EOF
        }

        let input = input.trim();
        if input.is_empty() || matches!(input, "/quit" | "/exit" | "/q") {
            break;
        }

        let result = engine.solve(input).await;
        print_result(&result);
        println!();
    }

    Ok(())
}
