//! Shared types for Tributary pipelines.
//!
//! A [`DatasetDescriptor`](descriptor::DatasetDescriptor) is the only place
//! where two datasets differ: the engine runs one code path for all of them.

#![warn(clippy::pedantic)]

pub mod descriptor;
pub mod identifier;
pub mod presets;
pub mod record;
pub mod stage;

pub use descriptor::{
    validate_registry, ColumnMapping, DatasetDescriptor, Derivation, DerivedField,
    DescriptorError, FillRule, FilterOp, FilterPredicate, TableMapping,
};
pub use record::Record;
pub use stage::Stage;
