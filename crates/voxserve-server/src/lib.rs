//! # voxserve-server
//!
//! HTTP gateway for the voxserve speech-synthesis server.

pub mod server;

pub use server::GatewayServer;
