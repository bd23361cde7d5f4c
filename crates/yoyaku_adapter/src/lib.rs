// --- File: crates/yoyaku_adapter/src/lib.rs ---
// Declare modules within this crate
pub mod client;
pub mod models;
pub mod service;

pub use client::UpstreamClient;
