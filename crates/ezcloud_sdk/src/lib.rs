//! Operation facade for ezcloud.
//!
//! This crate provides the high-level entry points (`query`, `mutation`,
//! `find`, `aggregate`, `queryGetFirstOne`, `mutationGetFirstOne`,
//! `operate`, `runGql`) that wrap document composition with conventional
//! aliasing, pagination and aggregation patterns, delegating execution to
//! an injected [`GqlTransport`] capability.

pub mod facade;
pub mod inputs;
pub mod transport;

pub use facade::{Facade, FindResult, OperateResult};
pub use inputs::{
    AggregateInput, FindInput, MutationGetFirstOneInput, MutationInput, OperateInput, QueryInput,
    RunGqlInput,
};
pub use transport::{unwrap_response, GqlTransport};
