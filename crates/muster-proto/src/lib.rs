//! # muster-proto
//!
//! Wire protocol types, constants, and data structures for the muster
//! group file-sharing network.
//!
//! This crate defines the two datagram shapes used on the multicast
//! command channel, the command tags, tunable defaults, and the error
//! type shared by all muster components.

pub mod constants;
pub mod datagram;
pub mod defaults;
pub mod error;

// Re-export commonly used types at the crate root
pub use datagram::{ComplexCmd, SimpleCmd};
pub use error::{NodeError, NodeResult};
