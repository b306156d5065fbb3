//! Kernels module - collective operations on distributed wave functions.

mod scratch;
mod inner;

pub use scratch::InnerScratch;
pub use inner::InnerProduct;
