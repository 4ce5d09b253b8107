//! The external-model seam for the Planner: a
//! [`Provider`] trait per vendor, and a retry/fallback ladder implemented
//! as a plain async function so the policy is testable against a fake
//! provider without a network call.

mod error;
mod fallback;
mod provider;

pub use error::ProviderError;
pub use fallback::{call_with_fallback, Completion};
pub use provider::{Provider, ReqwestProvider};
