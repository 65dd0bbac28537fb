//! # muster-core
//!
//! Runtime building blocks shared by muster components: the multicast
//! command-channel endpoint, pending-upload tracking, and the one-shot
//! transfer workers.

pub mod multicast;
pub mod pending;
pub mod transfer;
