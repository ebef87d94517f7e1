//! quillmind - AI Feature Orchestration for Content Platforms
//!
//! Turns named features (title generation, excerpts, content resizing,
//! descriptive text, classification, image generation, term cleanup) into
//! provider calls against OpenAI, Azure OpenAI, Gemini, xAI Grok, IBM Watson
//! NLU and the browser's built-in model.
//!
//! ## Core Features
//!
//! - **Features and Providers**: closed catalogs with a static feature →
//!   provider mapping and per-provider settings sub-documents
//! - **Access Control**: roles, per-user overrides and user opt-out
//! - **Token Budgets**: word-based estimation and content trimming per provider
//! - **Settings Persistence**: SQLite (or in-memory) settings and diagnostics
//! - **HTTP Surface**: axum router with bearer-token actors
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use quillmind::{AppContext, DispatchRequest, FeatureDispatcher, Route, Target};
//! use quillmind::types::Actor;
//!
//! let dispatcher = FeatureDispatcher::new(Arc::new(AppContext::in_memory()));
//! let result = dispatcher
//!     .dispatch(&Actor::operator(), DispatchRequest::new(Route::Title, Target::Item(12)))
//!     .await?;
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: providers, request client, prompts, token budgets, hooks
//! - [`feature`]: feature catalog, settings merge, access control, migration
//! - [`dispatch`]: route and settings entry point
//! - [`server`]: HTTP surface
//! - [`storage`]: settings/transient stores and host collaborators
//! - [`config`]: layered configuration

pub mod ai;
pub mod cli;
pub mod config;
pub mod constants;
pub mod context;
pub mod dispatch;
pub mod feature;
pub mod server;
pub mod storage;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader};

// Error Types
pub use types::error::{QuillError, Result, ResultExt, SettingsError};

// Context and Dispatch
pub use context::{AppContext, SharedContext};
pub use dispatch::{DispatchRequest, FeatureDispatcher, SettingsPayload, SettingsResponse};

// Storage
pub use storage::database::PoolConfig;
pub use storage::{Database, MemoryContent, MemoryStore, SharedDatabase};

// =============================================================================
// Feature and Provider Re-exports
// =============================================================================

pub use feature::{Feature, FeatureId, FeatureSettings, FeatureState, SaveMode};

pub use ai::{
    Provider, ProviderId, Route, RouteArgs, RouteResult, SharedProvider, Target, TokenCounter,
    create_provider,
};
