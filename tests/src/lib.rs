//! # Uplink Test Suite
//!
//! Unified test crate containing:
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── harness.rs        # Scripted control plane over the in-memory link
//! └── integration/      # End-to-end agent flows
//!     ├── handshake.rs  # Trust establishment, reconnect, key rotation
//!     └── commands.rs   # Dispatch, file sync, actions
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p uplink-tests
//!
//! # By category
//! cargo test -p uplink-tests integration::handshake::
//! cargo test -p uplink-tests integration::commands::
//!
//! # Benchmarks
//! cargo bench -p uplink-tests
//! ```

#![allow(dead_code)]

pub mod harness;
pub mod integration;
