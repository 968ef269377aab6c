//! Request lifecycle runtime for ezcloud.
//!
//! This crate drives one inbound cloud-function invocation end to end:
//! - `context`: The per-invocation request record
//! - `host`: The host capability boundary
//! - `lifecycle`: The state machine sequencing one request
//! - `builtin`: Built-in operation dispatch
//! - `auth`: The developer permission gate
//! - `sandbox`: Sandboxed execution of stored function code
//! - `crypto`: JWT and digest helpers exposed to sandboxed code
//!
//! Execution is single-threaded and synchronous; the host boundary owns
//! timeouts and cancellation.

pub mod auth;
pub mod builtin;
pub mod context;
pub mod crypto;
pub mod host;
pub mod lifecycle;
pub mod sandbox;

pub use builtin::Builtin;
pub use context::{RequestContext, RequestInfo, ScfRecord, SystemConfig, ROOT_SCF_DIR};
pub use crypto::CryptoSuite;
pub use host::{GqlPermission, HostCapabilities, HostTransport};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use sandbox::{EvaluatorConfig, RhaiEvaluator, SandboxSession, ScriptEvaluator};
