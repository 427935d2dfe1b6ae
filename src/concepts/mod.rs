//! Resource arguments
//!
//! Commands declare resource arguments as [`ResourceSpec`]s; the
//! [`Resolver`] binds them to parsed command-line values, properties and
//! other fall-throughs to produce canonical references.

mod resolver;
mod spec;

pub use resolver::{ArgumentValues, ConceptError, Resolved, Resolver};
pub use spec::{
    AttributeConfig, FallThrough, FallbackContext, FallbackFn, ResourceArg, ResourceSpec, Source, Surface,
};
