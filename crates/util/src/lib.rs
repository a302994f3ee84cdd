//! tree-state-util - state tree values and deep utilities
//!
//! The value model shared by the path resolver and the store, plus the deep
//! copy and deep comparison helpers the subscription layer relies on.

pub mod deep_copy;
pub mod deep_equal;
pub mod value;

// Re-exports for convenience
pub use deep_copy::deep_copy;
pub use deep_equal::{deep_equal, same_node};
pub use value::{Atomic, NodeId, ObjectMap, OpaqueHandle, StateArray, StateObject, StateValue};
