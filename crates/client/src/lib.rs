//! Client side of the voice-turn tutor.
//!
//! [`controller::TurnController`] owns the microphone and speaker and drives
//! one turn at a time; [`orchestration::OrchestrationClient`] talks to the
//! tutor server with bounded retry and keeps the conversation history.

pub mod api;
pub mod capture;
pub mod controller;
pub mod history_store;
pub mod orchestration;
pub mod playback;

pub use controller::{TurnController, TurnSnapshot, TurnState};
