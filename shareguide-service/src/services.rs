//! Core services that make up the shareguide verification engine.
//!
//! This module exposes all internal services used by the engine to drive
//! live sessions, talk to providers, and persist state. Each service is
//! designed to encapsulate a specific responsibility and can be used by
//! higher-level components such as the API or the main application state.
//!
//! # Services overview
//!
//! - [`clock`] – the time source the engine reads; injectable under test.
//! - [`engine`] – the per-connection session state machine.
//! - [`rate_limit`] – per-token sliding-window message limiting.
//! - [`repository`] – the database boundary for session rows and templates.
//! - [`session_store`] – durable token→state mapping with TTL.
//! - [`tts`] – the text-to-speech port.
//! - [`vision`] – the frame-analysis port.
//! - [`webhook`] – best-effort completion notifications.

pub mod clock;
pub(crate) mod engine;
pub(crate) mod rate_limit;
pub mod repository;
pub mod session_store;
pub mod tts;
pub mod vision;
pub mod webhook;
