//! AI Integration Layer
//!
//! Provider abstraction plus everything a route needs to build and send an
//! upstream request: content normalization, token budgeting, prompt lists,
//! request hooks, the HTTP client wrapper and the latest-response cache.

pub mod diagnostics;
pub mod hooks;
pub mod normalizer;
pub mod prompt;
pub mod provider;
pub mod request;
pub mod tokenizer;

pub use hooks::{HookContext, HookStage, Hooks};
pub use normalizer::ContentNormalizer;
pub use prompt::PromptEntry;
pub use provider::{
    Endpoint, Provider, ProviderId, Route, RouteArgs, RouteCall, RouteResult, SharedProvider,
    Target, create_provider,
};
pub use request::{ApiRequest, Credentials, RequestOptions};
pub use tokenizer::TokenCounter;
