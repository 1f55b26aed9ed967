//! Tutor API Library Crate
//!
//! This library contains the HTTP side of the voice-turn pipeline: the
//! configuration, provider adapters, handlers, and routing. The binaries in
//! `bin/` are thin wrappers around it.

pub mod audio_utils;
pub mod config;
pub mod handlers;
pub mod provider;
pub mod router;
pub mod state;
