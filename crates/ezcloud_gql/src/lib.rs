//! GraphQL document building for ezcloud.
//!
//! This crate turns a declarative selection/argument tree into GraphQL
//! document text, deterministically:
//! - `value`: Argument values and their rendering (quoting, raw literals)
//! - `fields`: Field descriptors and selection-set serialization
//! - `operation`: Full operation composition and variable extraction
//!
//! No schema awareness and no validation of the emitted document beyond
//! structural composition.

pub mod fields;
pub mod operation;
pub mod value;

pub use fields::{render_fields, Directive, FieldNode, Fields};
pub use operation::{GqlDocument, Operation, OperationKind};
pub use value::{render_args, render_value, ArgMap, ArgValue};
