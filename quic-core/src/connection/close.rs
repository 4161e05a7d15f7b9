// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Hooks for applications to rewrite CONNECTION_CLOSE frames before they
//! reach the wire, so sensitive reasons/frame-types aren't leaked to peers.

use crate::{application, frame::ConnectionClose, transport};

pub trait Formatter: 'static + Send + Sync {
    fn format_transport_error(&self, context: &Context, error: transport::Error)
        -> ConnectionClose;

    fn format_application_error(
        &self,
        context: &Context,
        error: application::Error,
    ) -> ConnectionClose;

    /// Formats an error for use in early (Initial/Handshake) packets, where
    /// application state must not be revealed (RFC 9000 §10.2.3).
    fn format_early_transport_error(
        &self,
        context: &Context,
        error: transport::Error,
    ) -> ConnectionClose;

    fn format_early_application_error(
        &self,
        context: &Context,
        error: application::Error,
    ) -> ConnectionClose;
}

#[non_exhaustive]
#[derive(Debug)]
pub struct Context<'a> {
    pub remote_address_debug: &'a str,
}

/// Passes errors through unmodified. Intended for local development only,
/// as it can leak potentially sensitive reasons to the peer.
#[derive(Clone, Copy, Debug, Default)]
pub struct Development;

impl Formatter for Development {
    fn format_transport_error(&self, _: &Context, error: transport::Error) -> ConnectionClose {
        error.into()
    }

    fn format_application_error(
        &self,
        _: &Context,
        error: application::Error,
    ) -> ConnectionClose {
        ConnectionClose {
            error_code: error.code,
            frame_type: None,
        }
    }

    fn format_early_transport_error(
        &self,
        context: &Context,
        error: transport::Error,
    ) -> ConnectionClose {
        self.format_transport_error(context, error)
    }

    fn format_early_application_error(
        &self,
        _: &Context,
        error: application::Error,
    ) -> ConnectionClose {
        ConnectionClose {
            error_code: error.code,
            frame_type: None,
        }
    }
}

/// Removes potentially sensitive information: `INTERNAL_ERROR` is rewritten
/// as `PROTOCOL_VIOLATION`, and application codes are hidden entirely in
/// early packets (RFC 9000 §10.2.3).
#[derive(Clone, Copy, Debug, Default)]
pub struct Production;

impl Formatter for Production {
    fn format_transport_error(&self, _: &Context, error: transport::Error) -> ConnectionClose {
        if error.code == transport::Error::INTERNAL_ERROR.code {
            return transport::Error::PROTOCOL_VIOLATION.into();
        }
        transport::Error::new(error.code).into()
    }

    fn format_application_error(
        &self,
        _: &Context,
        error: application::Error,
    ) -> ConnectionClose {
        ConnectionClose {
            error_code: error.code,
            frame_type: None,
        }
    }

    fn format_early_transport_error(
        &self,
        context: &Context,
        error: transport::Error,
    ) -> ConnectionClose {
        Self.format_transport_error(context, error)
    }

    fn format_early_application_error(
        &self,
        _: &Context,
        _error: application::Error,
    ) -> ConnectionClose {
        transport::Error::APPLICATION_ERROR.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CTX: Context = Context {
        remote_address_debug: "test",
    };

    #[test]
    fn production_hides_internal_error() {
        let close = Production.format_transport_error(&CTX, transport::Error::INTERNAL_ERROR);
        assert_eq!(close.error_code, transport::Error::PROTOCOL_VIOLATION.code);
    }

    #[test]
    fn production_hides_application_errors_in_early_packets() {
        let close = Production.format_early_application_error(
            &CTX,
            application::Error {
                code: crate::varint::VarInt::new(42).unwrap(),
            },
        );
        assert_eq!(close.error_code, transport::Error::APPLICATION_ERROR.code);
    }

    #[test]
    fn development_passes_through() {
        let close = Development.format_transport_error(&CTX, transport::Error::INTERNAL_ERROR);
        assert_eq!(close.error_code, transport::Error::INTERNAL_ERROR.code);
    }
}
