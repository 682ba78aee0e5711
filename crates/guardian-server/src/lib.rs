//! # guardian-server
//!
//! Process wiring for the guardian lockbox controller: logging, the shared
//! handler state and the local HTTP diagnostics API. The binary in
//! `main.rs` assembles these with the access controller from
//! `guardian-core` and the BLE peripheral.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod state;
