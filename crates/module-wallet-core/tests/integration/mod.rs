//! Integration tests module
//!
//! End-to-end flows across modules, the guardian store and the relayer.

pub mod recovery_flow_test;
pub mod relayer_test;
