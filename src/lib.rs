//! Secure code-execution supervisor for LLM agents.
//!
//! An external model proposes Python; crucible runs each snippet in a
//! disposable, network-isolated, resource-capped container, sanitizes every
//! byte the container emits, and feeds the sanitized observation back to the
//! model until it produces a `FINAL(...)` answer.
//!
//! The safety contract is fail-closed end to end: no secure runtime means no
//! execution, unfilterable output means no observation, and a breached cost
//! ceiling means no further model calls.
//!
//! ```no_run
//! use crucible::{Orchestrator, OrchestratorConfig, Settings};
//!
//! # async fn demo() -> crucible::Result<()> {
//! let settings = Settings::from_env()?;
//! let orchestrator =
//!     Orchestrator::from_settings(settings, OrchestratorConfig::default()).await?;
//! let result = orchestrator.run("What is 2+2?", None).await;
//! println!("{:?}", result.final_answer);
//! # Ok(())
//! # }
//! ```

pub mod budget;
pub mod context;
pub mod detect;
pub mod egress;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod parse;
pub mod sandbox;
pub mod settings;

pub use error::{Error, Result};
pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorResult};
pub use settings::Settings;
