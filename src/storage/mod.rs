//! Storage module - distributed coefficient arrays.

mod slab;

pub use slab::CoeffSlab;
