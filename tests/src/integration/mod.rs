//! # Integration Flows
//!
//! The agent wired end to end over the in-memory link, with the control
//! plane scripted by [`crate::harness`].

pub mod commands;
pub mod handshake;
