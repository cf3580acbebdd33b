//! # FluxGate — A Distributed Rate-Limiting Engine
//!
//! FluxGate is a rate-limiting engine meant to be embedded in an HTTP
//! service rather than run as a standalone gateway: callers hold an
//! [`Engine`](engine::Engine) and call `check` once per request.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────┐   ┌─────────────────────────────────────────────┐   ┌───────────┐
//! │  Caller  │──▶│                   Engine                    │──▶│  Bucket   │
//! │ (HTTP)   │   │  rule lookup → key resolution → bands       │   │  Store    │
//! └──────────┘   └─────────────────────┬───────────────────────┘   └───────────┘
//!                                      │
//!                        ┌─────────────┴─────────────┐
//!                        ▼                            ▼
//!                 ┌─────────────┐              ┌─────────────┐
//!                 │ Rule Cache  │◀── reload ───│ Rule Store  │
//!                 │  (moka)     │   strategy    │ (Mongo/mem) │
//!                 └─────────────┘              └─────────────┘
//! ```
//!
//! ## Core Components
//!
//! - [`engine::Engine`] — the single entry point: resolves a rule set,
//!   evaluates every enabled rule that applies to the request.
//! - [`rate_limiter::RateLimiter`] — multi-band evaluation and compensation.
//! - [`bucket_store`] — the atomic token-bucket decision, Redis-backed or
//!   in-process.
//! - [`rule_store`] — durable rule set storage, MongoDB-backed or in-memory.
//! - [`key_resolver`] — maps a request context to a rate-limit subject key.
//! - [`rule_cache`] / [`caching_provider`] / [`reload`] — hot-reloadable
//!   rule set caching.
//! - [`resilience`] — retry and circuit-breaking around the bucket store.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fluxgate::config::Config;
//! use fluxgate::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config")?;
//!     let server = Server::new(&config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod bucket_reset_handler;
pub mod bucket_store;
pub mod caching_provider;
pub mod config;
pub mod config_validator;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod health;
pub mod key_resolver;
pub mod metrics;
pub mod model;
pub mod rate_limiter;
pub mod reload;
pub mod resilience;
pub mod response;
pub mod rule_cache;
pub mod rule_store;
pub mod server;
pub mod validation;

pub use config::Config;
pub use engine::Engine;
pub use error::{FluxGateError, Result};
pub use model::{Band, RateLimitResult, RequestContext, Rule, RuleSet, Scope};

/// Version of the fluxgate library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
