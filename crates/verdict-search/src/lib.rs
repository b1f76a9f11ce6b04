//! Web search evidence for Verdict pipelines.
//!
//! [`FetchClient`] posts queries to an HTML search endpoint with a rotating
//! browser identity, backs off on throttling, and paces every caller through
//! a single gate.

pub mod client;
pub mod identity;
pub mod snippets;
pub mod transport;

pub use client::{FetchClient, RetryPolicy};
pub use identity::IdentityProfile;
pub use snippets::extract_snippets;
pub use transport::{HttpTransport, SearchReply, Transport};
