#![deny(missing_docs)]
//! Core type definitions for the shareguide verification service.
//!
//! This crate groups together the strongly-typed values and message
//! structures used across the shareguide system. It provides:
//!
//! * The wire protocol exchanged over the guided-session WebSocket (see
//!   [`protocol`] module).
//! * The verification template model: ordered steps with instructions,
//!   success criteria, navigation links, extraction schemas, and interaction
//!   challenges (see [`template`] module).
//! * The frame-analysis contract that vision providers must satisfy (see
//!   [`analysis`] module).
//! * The trust report produced when a session completes (see [`trust`]
//!   module).
//!
//! Use these types to pass, store, and (de)serialize session data in a
//! type-safe way throughout your application.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod analysis;
pub mod protocol;
pub mod template;
pub mod trust;

/// An opaque URL-safe token binding a client connection to its server-side
/// session.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Creates a new `SessionToken` by wrapping a `String`.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<String> for SessionToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionToken {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}
