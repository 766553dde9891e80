extern crate self as xchg;

pub mod engine;
pub mod session;
pub mod tile;

pub use core_affinity;
pub use tracing;
pub use xchg_network as network;
pub use xchg_timing as timing;
pub use xchg_utils as utils;
