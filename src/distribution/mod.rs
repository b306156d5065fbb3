//! Distribution module - mapping of global row ranges onto ranks.

mod block;

pub use block::BlockDistribution;
