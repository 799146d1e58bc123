//! Generated gRPC protocol definitions for the quantum job scheduler.
//!
//! This crate provides the protocol buffer definitions and generated code
//! for communication between SDK clients (submission surface) and physical-lab
//! worker servers (execution surface).
pub mod scheduler {
    pub mod v1 {
        tonic::include_proto!("scheduler.v1");
    }
}

// Re-export commonly used types for convenience
pub use scheduler::v1::*;
