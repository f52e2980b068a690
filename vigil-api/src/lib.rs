//! Vigil gRPC API
//!
//! This crate defines the gRPC protocol for agent → server metric ingestion.
//! The protobuf definitions are in `proto/vigil.proto` and code-generated via
//! `tonic-build`.

// Include the generated code
pub mod vigil {
    pub mod v1 {
        tonic::include_proto!("vigil.v1");
    }
}
