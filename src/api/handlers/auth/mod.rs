//! Auth and account handlers.
//!
//! Every credential-bearing endpoint follows the same discipline: rate limit
//! first, then the lockout gate, then the hash comparison, and one generic
//! rejection regardless of which stage failed. Lookups by email go through
//! the keyed digest so plaintext addresses never appear in queries.

pub(crate) mod deletion;
pub(crate) mod login;
pub(crate) mod reset;
pub(crate) mod session;
mod state;
mod storage;
pub(crate) mod types;
mod utils;
pub(crate) mod verification;

pub use state::{PortalConfig, PortalState};
