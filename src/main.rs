//! Command-line entry point.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crucible::budget::PricingTable;
use crucible::orchestrator::{Orchestrator, OrchestratorConfig};
use crucible::sandbox::{DockerSupervisor, SandboxConfig};
use crucible::settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "crucible", about = "Secure code-execution supervisor for LLM agents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer a query by driving the agent loop
    Run {
        /// The question or task for the agent
        query: String,

        /// Context file mounted read-only into the sandbox
        #[arg(short, long)]
        context: Option<PathBuf>,

        /// Abort the run when the egress filter redacts anything
        #[arg(long)]
        raise_on_leak: bool,

        /// Extra instructions appended to the system prompt
        #[arg(long)]
        instructions: Option<String>,

        /// Override the configured iteration cap
        #[arg(long)]
        max_iterations: Option<u32>,
    },

    /// Audit the sandbox security posture without running anything
    SecurityCheck,

    /// Show the pricing table in effect
    Pricing,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("crucible=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::from_env()?;

    match cli.command {
        Command::Run {
            query,
            context,
            raise_on_leak,
            instructions,
            max_iterations,
        } => {
            if let Some(cap) = max_iterations {
                settings.max_iterations = cap;
            }
            let config = OrchestratorConfig {
                raise_on_leak,
                custom_instructions: instructions,
            };

            let orchestrator = Orchestrator::from_settings(settings, config).await?;
            let result = orchestrator.run(&query, context).await;

            for step in &result.steps {
                tracing::debug!(
                    iteration = step.iteration,
                    action = step.action.as_str(),
                    cost = %step.cost_delta,
                    "step"
                );
            }

            println!(
                "iterations: {}   spent: ${} of ${}",
                result.iterations, result.budget.spent, result.budget.limit
            );
            match (&result.final_answer, &result.error) {
                (Some(answer), _) => println!("\n{answer}"),
                (None, Some(failure)) => {
                    eprintln!("run failed [{}]: {}", failure.code, failure.message);
                    std::process::exit(1);
                }
                (None, None) => {
                    eprintln!("run ended without an answer");
                    std::process::exit(1);
                }
            }
        }

        Command::SecurityCheck => {
            let supervisor =
                DockerSupervisor::connect(SandboxConfig::from_settings(&settings)).await?;
            let audit = supervisor.validate_security().await;

            let check = |ok: bool| if ok { "ok" } else { "FAIL" };
            println!("daemon available:  {}", check(audit.daemon_available));
            println!("secure runtime:    {}", check(audit.secure_runtime));
            println!("network disabled:  {}", check(audit.network_disabled));
            println!("memory limited:    {}", check(audit.memory_limited));
            println!("pids limited:      {}", check(audit.pids_limited));

            if !audit.secure_runtime && !settings.allow_unsafe_runtime {
                println!(
                    "\nno user-space-kernel runtime registered: execution will refuse to start"
                );
            }
        }

        Command::Pricing => {
            let table = PricingTable::load(settings.pricing_path.as_deref())?;
            if table.is_builtin() {
                println!("(built-in table; prices may be stale)\n");
            }
            println!("{:<28} {:>10} {:>10}", "model", "in $/M", "out $/M");
            for (name, pricing) in table.entries() {
                println!(
                    "{:<28} {:>10} {:>10}",
                    name, pricing.input_cost_per_m, pricing.output_cost_per_m
                );
            }
        }
    }

    Ok(())
}
