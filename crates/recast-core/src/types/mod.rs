//! Attribute type descriptors and symbolic type lookup.

pub mod descriptor;
pub mod lookup;

pub use descriptor::{CastBehavior, CastType, TypeDescriptor};
pub use lookup::{TypeFactory, TypeLookup};
