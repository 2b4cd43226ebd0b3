use clap::{Parser, Subcommand};
use kubeloom::{logging, open_store, Config, Execution, Orchestrator, Workflow};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

/// Inspect workflows recorded by the kubeloom engine.
#[derive(Debug, Parser)]
#[command(name = "kubeloom", version, about)]
struct Cli {
    /// TOML configuration file (environment variables still override it)
    #[arg(short, long, global = true, env = "KUBELOOM_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show a workflow and its step executions
    Status {
        /// Workflow identity, e.g. k3s-development-1a2b3c4d
        workflow_id: String,
    },
    /// List all workflows, oldest first
    List,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path).and_then(Config::apply_env),
        None => Config::from_env(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(2);
        }
    };
    logging::init_logging(&config);

    match run(cli.command, &config).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: &Config) -> Result<ExitCode, kubeloom::EngineError> {
    let store = open_store(config).await?;
    let orchestrator = Orchestrator::new(store);

    match command {
        Command::Status { workflow_id } => {
            let Some(workflow) = orchestrator.get_workflow_status(&workflow_id).await? else {
                eprintln!("Workflow not found: {}", workflow_id);
                return Ok(ExitCode::FAILURE);
            };
            print_workflow(&workflow);

            let executions = orchestrator.list_executions(&workflow_id).await?;
            println!();
            println!("Executions ({}):", executions.len());
            for execution in &executions {
                print_execution(execution);
            }
        }
        Command::List => {
            let workflows = orchestrator.list_workflows().await?;
            if workflows.is_empty() {
                println!("No workflows recorded");
            }
            for workflow in &workflows {
                println!(
                    "{:<36} {:<13} {:<10} {:<12} {}",
                    workflow.workflow_id,
                    workflow.status.as_str(),
                    workflow.platform,
                    workflow.environment,
                    workflow.created_at.to_rfc3339()
                );
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_workflow(workflow: &Workflow) {
    println!("Workflow:    {}", workflow.workflow_id);
    println!("Status:      {}", workflow.status);
    println!("Platform:    {}", workflow.platform);
    println!("Environment: {}", workflow.environment);
    println!("Created:     {}", workflow.created_at.to_rfc3339());
    println!("Updated:     {}", workflow.updated_at.to_rfc3339());

    let mut steps: Vec<&String> = workflow.outputs.keys().collect();
    steps.sort();
    if !steps.is_empty() {
        let steps: Vec<&str> = steps.into_iter().map(String::as_str).collect();
        println!("Outputs:     {}", steps.join(", "));
    }
    if !workflow.errors.is_empty() {
        println!("Errors ({}):", workflow.errors.len());
        for e in &workflow.errors {
            println!("  - {}", e);
        }
    }
}

fn print_execution(execution: &Execution) {
    let duration = execution
        .duration()
        .map(|d| format!("{:.2}s", d.num_milliseconds() as f64 / 1000.0))
        .unwrap_or_else(|| "-".to_string());
    println!(
        "  {} {:<15} {:<8} {:>8}  {}",
        execution.short_id(),
        execution.agent_name,
        execution.status.as_str(),
        duration,
        execution.started_at.to_rfc3339()
    );
    if let Some(message) = &execution.error_message {
        for line in message.lines() {
            println!("      {}", line);
        }
    }
}
