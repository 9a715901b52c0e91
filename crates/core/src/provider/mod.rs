//! External generation providers.
//!
//! A provider accepts a generation request and exposes only a status
//! endpoint to poll. [`GenerationProvider`] is the capability interface;
//! [`HttpProvider`] drives JSON-over-HTTP APIs described in configuration,
//! and [`StatusPoller`] turns whatever a provider reports into a
//! [`PollOutcome`] the orchestrator can act on.

mod config;
mod http;
mod poller;
mod registry;
mod traits;
mod types;

pub use config::{ProviderConfig, ResponseMapping};
pub use http::HttpProvider;
pub use poller::{PollerConfig, StatusPoller};
pub use registry::ProviderRegistry;
pub use traits::GenerationProvider;
pub use types::{PollOutcome, ProviderError, ProviderJobStatus, StatusClass, StatusVocabulary};
