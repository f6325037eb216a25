//! Controller start-up failure classification.
//!
//! Only the first connect attempt is classified. Failures that can't fix
//! themselves (port held by another program, port that doesn't exist) stop
//! the process with a notification; everything else is left to the
//! controller's retry loop.

use std::io::ErrorKind;

use crate::controller::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartFailure {
    Fatal { title: String, message: String },
    Transient,
}

pub fn classify(error: &TransportError) -> StartFailure {
    match error {
        TransportError::SerialOpen { port, source } if source.kind() == ErrorKind::PermissionDenied => {
            StartFailure::Fatal {
                title: format!("Can't connect to {}!", port),
                message: "This slider port is busy, make sure to close any slider monitor or other mixbridge instance."
                    .to_string(),
            }
        }
        TransportError::SerialOpen { port, source } if source.kind() == ErrorKind::NotFound => {
            StartFailure::Fatal {
                title: format!("Can't connect to {}!", port),
                message: "This slider port doesn't exist, check your configuration and make sure it's set correctly."
                    .to_string(),
            }
        }
        TransportError::UdpBind { port, .. } => StartFailure::Fatal {
            title: format!("Could not start UDP listener on port {}!", port),
            message: "This UDP port is busy, make sure to close any slider monitor or other mixbridge instance."
                .to_string(),
        },
        _ => StartFailure::Transient,
    }
}
