//! Library surface exposing the daemon's tasks for integration testing.
//! `main.rs` is a thin binary wrapper around these modules.

pub mod broadcaster;
pub mod dsp_client;
pub mod hub;
pub mod ingress;
pub mod reactor;
