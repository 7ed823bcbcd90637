//! OpenAI-compatible gateway with content-policy enforcement.
//!
//! The gateway sits between client applications and an LLM provider. Every
//! request whose path is bound to a rule is screened before it is
//! forwarded, and the upstream response is moderated on its way back.
//! Paths without a rule are forwarded untouched.
//!
//! # Features
//!
//! - **Request screening**: local sensitive words, then vendor prompt checks
//! - **Streaming moderation**: SSE responses checked batch by batch
//! - **Buffered moderation**: JSON completions checked before delivery
//! - **Circuit breaking**: one breaker per vendor and rule
//! - **Statistics**: request, block and breaker counters at `/stats`
//!
//! # Usage
//!
//! ```rust,ignore
//! use contentguard::{config::Config, proxy::GatewayServer};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_file("contentguard.toml").unwrap();
//!     let server = GatewayServer::new(config).unwrap();
//!     server.run().await.unwrap();
//! }
//! ```
//!
//! # Endpoints
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/health` | GET | Health check |
//! | `/stats` | GET | Request, stream and breaker statistics |
//! | `/stats/reset` | POST | Reset request statistics |
//! | anything else | any | Forwarded to `proxy.upstream` |

mod rules;
mod server;
mod stats;

pub use rules::RuleCache;
pub use server::{GatewayServer, GatewayState};
pub use stats::{ProxyStats, StatsSummary};
