//! SeekHelp - decision recommendation service
//!
//! CLI entry point for serving the HTTP API and running one-off recommendations.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result, bail};
use tracing::{debug, info};

use seekhelp::chat::ChatService;
use seekhelp::cli::{Cli, Command, OutputFormat, get_log_path};
use seekhelp::config::Config;
use seekhelp::domain::{PipelineResponse, RawDecisionRequest};
use seekhelp::llm::{LlmClient, create_client};
use seekhelp::pipeline::RecommendationPipeline;
use seekhelp::prompts::PromptLoader;
use seekhelp::server::{self, AppState};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    let log_dir = log_path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(provider = %config.llm.provider, "SeekHelp loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Serve { bind } => cmd_serve(&config, bind).await,
        Command::Recommend {
            context,
            preferences,
            constraints,
            file,
            format,
        } => {
            let raw = match file {
                Some(path) => read_request_file(&path)?,
                None => RawDecisionRequest {
                    context: context.unwrap_or_default().into(),
                    preferences: preferences.into(),
                    constraints: constraints.into(),
                },
            };
            cmd_recommend(&config, raw, format).await
        }
        Command::Config => cmd_config(&config),
        Command::Logs { lines } => cmd_logs(lines),
    }
}

fn build_pipeline(config: &Config, llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>) -> RecommendationPipeline {
    RecommendationPipeline::new(llm, prompts, config.pipeline.clone())
}

async fn cmd_serve(config: &Config, bind: Option<String>) -> Result<()> {
    debug!(?bind, "cmd_serve: called");
    config.validate()?;

    let llm = create_client(&config.llm).context("Failed to create LLM client")?;
    let prompts = Arc::new(PromptLoader::from_config(&config.prompts)?);
    let state = AppState {
        pipeline: Arc::new(build_pipeline(config, llm.clone(), prompts.clone())),
        chat: Arc::new(ChatService::new(llm, prompts, config.chat.clone())),
    };

    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    println!("SeekHelp listening on http://{}", listener.local_addr()?);

    server::serve(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl-C received, shutting down");
    })
    .await
    .context("HTTP server failed")?;
    Ok(())
}

fn read_request_file(path: &Path) -> Result<RawDecisionRequest> {
    debug!(?path, "read_request_file: called");
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))?;
    if !value.is_object() {
        bail!("{} must contain a JSON object", path.display());
    }
    serde_json::from_value(value).with_context(|| format!("{} is not a request object", path.display()))
}

async fn cmd_recommend(config: &Config, raw: RawDecisionRequest, format: OutputFormat) -> Result<()> {
    debug!(%format, "cmd_recommend: called");
    config.validate()?;

    let llm = create_client(&config.llm).context("Failed to create LLM client")?;
    let prompts = Arc::new(PromptLoader::from_config(&config.prompts)?);
    let pipeline = build_pipeline(config, llm, prompts);

    let response = match pipeline.run_raw(raw).await {
        Ok(response) => response,
        Err(e) => bail!("Recommendation failed at the {} stage: {}", e.stage(), e),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
        OutputFormat::Text => print_response(&response),
    }
    Ok(())
}

fn print_list(heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!();
    println!("{}", heading.bold());
    for item in items {
        println!("  - {}", item);
    }
}

fn print_response(response: &PipelineResponse) {
    let analysis = &response.analysis;
    println!("{}", "Analysis".bold());
    println!("  {}", analysis.analysis);

    println!();
    println!("{}", "Specialists".bold());
    for (task, status) in analysis.tasks.iter().zip(&analysis.worker_status) {
        let mark = if status.success { "ok".green() } else { "failed".red() };
        println!("  [{}] {}: {}", mark, task.kind.label(), task.description);
        if let Some(error) = &status.error {
            println!("       {}", error.dimmed());
        }
    }

    let fin = &response.final_recommendation;
    println!();
    println!("{}", "Recommendation".bold().cyan());
    println!("  {}", fin.summary);
    println!();
    println!("  {}", fin.reasoning);

    print_list("Key points", &fin.key_points);
    print_list("Next steps", fin.next_steps.as_deref().unwrap_or_default());
    print_list("Resources", fin.resources.as_deref().unwrap_or_default());
}

fn cmd_config(config: &Config) -> Result<()> {
    debug!("cmd_config: called");
    let yaml = serde_yaml::to_string(config).context("Failed to serialize configuration")?;
    print!("{}", yaml);
    Ok(())
}

fn cmd_logs(lines: usize) -> Result<()> {
    debug!(lines, "cmd_logs: called");
    let log_path = get_log_path();

    if !log_path.exists() {
        println!("No log file found at: {}", log_path.display());
        return Ok(());
    }

    let file = fs::File::open(&log_path).context("Failed to open log file")?;
    let all_lines: Vec<String> = BufReader::new(file).lines().map_while(Result::ok).collect();
    let start = all_lines.len().saturating_sub(lines);
    for line in &all_lines[start..] {
        println!("{}", line);
    }
    Ok(())
}
