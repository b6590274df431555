//! Shared error types for the cluster manager

pub mod error;

pub use error::{ClusterError, ClusterResult};
