//! Read-only context files for agent queries.
//!
//! A [`ContextHandle`] memory-maps a host file and exposes a narrow
//! search/snippet API, so multi-megabyte contexts never need to be loaded
//! whole — not on the host, and not inside the sandbox.

mod handle;

pub use handle::{ContextHandle, MAX_SEARCH_RESULTS};
