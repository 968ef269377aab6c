//! Core types for ezcloud.
//!
//! This crate provides foundational types used throughout ezcloud:
//! - `envelope`: The per-request response envelope
//! - `outcome`: Outcome signals used to end sandboxed execution early
//! - `error`: Typed error system

pub mod envelope;
pub mod error;
pub mod outcome;

pub use envelope::Envelope;
pub use error::{CloudError, CloudResult, ErrorCode};
pub use outcome::Signal;
