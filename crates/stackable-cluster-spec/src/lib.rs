//! Typed, validating spec trees for the `DaskCluster`, `RayCluster` and `SparkCluster`
//! custom resources of the `distributed-compute.dominodatalab.com` API group.
//!
//! Specs are generic [`SpecNode`] trees checked against a [`SchemaRegistry`], so fields
//! added by newer resource versions can be taught to a client through schema definition
//! files instead of a rebuild.
//!
//! ## Crate Features
//!
//! - `default` enables `clap`.
//! - `clap` derives `clap::Args` for [`cli::SpecOptions`] and [`logging::LoggingOptions`], and
//!   builds the `cluster-spec` tool which checks resource files and prints them canonically.

pub mod builder;
pub mod cli;
pub mod cluster;
pub mod codec;
pub mod logging;
pub mod node;
pub mod path;
pub mod resource;
pub mod schema;
pub mod validation;
pub mod value;

// External re-exports
pub use k8s_openapi;
// Internal re-exports
pub use cluster::ClusterKind;
pub use codec::{Codec, DecodeError, EncodeError};
pub use node::{FieldSlot, SetError, SpecNode};
pub use path::FieldPath;
pub use resource::ClusterResource;
pub use schema::{SchemaError, SchemaRegistry, UnknownFieldError};
pub use validation::{ValidationError, ValidationErrors, Validator};
pub use value::{FieldValue, ValueKind};
