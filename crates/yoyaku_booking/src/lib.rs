// --- File: crates/yoyaku_booking/src/lib.rs ---
// Declare modules within this crate
pub mod availability;
pub mod cache;
#[cfg(test)]
mod cache_test;
pub mod error;
pub mod handlers;
pub mod orchestrator;
#[cfg(test)]
mod orchestrator_test;
pub mod refresh;
pub mod routes;
#[cfg(test)]
mod testutil;
pub mod verify;
