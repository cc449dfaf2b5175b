//! Egress filtering for everything that leaves the sandbox.
//!
//! Raw container output is never shown to the model. It passes through a
//! fixed pipeline first:
//!
//! ```text
//! raw bytes ─▶ binary gate ─▶ truncation ─▶ secret patterns ─▶ entropy ─▶ context echo ─▶ observation
//!                  │               │              │                │             │
//!                  └───────────────┴──────────────┴── events ──────┴─────────────┘
//! ```
//!
//! Each stage may rewrite the buffer and emits an [`EgressEvent`] per firing.
//! Under the `raise_on_leak` policy any non-truncation event aborts the run
//! instead of returning sanitized text.

mod event;
mod filter;

pub use event::{EgressEvent, EgressKind};
pub use filter::{EgressConfig, EgressFilter, FilterOutcome};
