//! This module defines the [`Error`] a guided-session connection may
//! encounter. It further provides a method to transform the encountered
//! errors into a close frame if necessary.
//!
//! Only terminal conditions surface here: validation problems, rate
//! limiting, and provider failures are answered inline with an `error`
//! message and the connection stays open.

use std::io::ErrorKind;

use axum::extract::ws::{CloseFrame, close_code};
use shareguide_types::protocol::close_codes;
use tracing::instrument;
use tungstenite::error::ProtocolError;

/// All terminal errors that may occur during a guided session.
#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("Session not found")]
    SessionNotFound,
    #[error("Session has expired")]
    SessionExpired,
    #[error("Template not found")]
    TemplateNotFound,
    #[error("Connection closed by peer")]
    ConnectionClosed,
    #[error(transparent)]
    Axum(#[from] axum::Error),
    #[error("internal error: {0}")]
    Internal(#[from] eyre::Report),
}

impl Error {
    /// Transforms the error into a
    /// [`CloseFrame`](https://docs.rs/axum/latest/axum/extract/ws/struct.CloseFrame.html)
    /// if necessary.
    #[instrument(level = "debug", skip_all)]
    pub(crate) fn into_close_frame(self) -> Option<CloseFrame> {
        tracing::debug!("{self:?}");
        match self {
            Error::ConnectionClosed => {
                // nothing to do here
                None
            }
            Error::SessionNotFound | Error::TemplateNotFound => Some(CloseFrame {
                code: close_code::POLICY,
                reason: self.to_string().into(),
            }),
            Error::SessionExpired => Some(CloseFrame {
                code: close_codes::TIMEOUT,
                reason: self.to_string().into(),
            }),
            Error::Axum(axum_error) => {
                // try down casting if close-without-handshake
                let inner = axum_error.into_inner();
                if let Some(tungstenite::Error::Protocol(
                    ProtocolError::ResetWithoutClosingHandshake,
                )) = inner.downcast_ref()
                {
                    tracing::trace!("nothing to do client closed session (tungstenite error)");
                    None
                } else if let Some(io_err) = inner.downcast_ref::<std::io::Error>()
                    && io_err.kind() == ErrorKind::ConnectionReset
                {
                    tracing::trace!("nothing to do client closed session (Os error)");
                    None
                } else {
                    Some(CloseFrame {
                        code: close_code::ERROR,
                        reason: "unexpected error".into(),
                    })
                }
            }
            Error::Internal(err) => {
                tracing::error!("internal error during session: {err:?}");
                Some(CloseFrame {
                    code: close_code::ERROR,
                    reason: "unexpected error".into(),
                })
            }
        }
    }

    /// The client-facing `error` message emitted before closing, if any.
    pub(crate) fn client_message(&self) -> Option<&'static str> {
        match self {
            Error::SessionNotFound => Some("Session not found"),
            Error::SessionExpired => Some("Session has expired"),
            Error::TemplateNotFound => Some("Template not found"),
            _ => None,
        }
    }
}
