// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the NV hash-chain tools
//!
//! One top-level [`Error`] with a variant per failure category; the
//! category enums carry the detail.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Top-level error reported by the tools
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid authorization: {0}")]
    Auth(#[from] AuthError),

    #[error("i/o error: {0}")]
    Io(#[from] IoError),

    #[error("TPM command error: {0}")]
    Command(#[from] CommandError),
}

/// Invocation rejected before any TPM interaction
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("at most {limit} auxiliary sessions may be supplied")]
    TooManyAuxSessions { limit: usize },

    #[error("'{argument}' is not an NV index handle")]
    NotAnNvIndex { argument: String },

    #[error("unknown session type '{value}', expected policy, hmac, or trial")]
    UnknownSessionKind { value: String },
}

/// The authorizing principal or its auth value could not be resolved
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("cannot resolve '{reference}' to a hierarchy or object")]
    UnknownReference { reference: String },

    #[error("the {hierarchy} hierarchy cannot authorize NV operations")]
    HierarchyNotAllowed { hierarchy: &'static str },

    #[error("invalid hex auth value")]
    BadHexAuth(#[from] hex::FromHexError),

    #[error("{}: saved context does not hold a session (handle {:#010x})", path.display(), .handle)]
    NotASessionContext { path: PathBuf, handle: u32 },

    #[error("{}: saved context is truncated", path.display())]
    TruncatedContext { path: PathBuf },
}

/// Reading the payload or writing an artifact failed
#[derive(Debug, Error)]
pub enum IoError {
    #[error("failed to read payload from {}", path.display())]
    ReadInput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read payload from standard input")]
    ReadStdin {
        #[source]
        source: io::Error,
    },

    #[error("failed to read saved context {}", path.display())]
    ReadContext {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write digest to {}", path.display())]
    WriteDigest {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write saved context {}", path.display())]
    WriteContext {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The TPM transport or the TPM itself rejected a command
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to open TPM device {path}")]
    OpenDevice {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write TPM command")]
    WriteCommand(#[source] io::Error),

    #[error("failed to read TPM response")]
    ReadResponse(#[source] io::Error),

    #[error("invalid TPM response size {size}")]
    InvalidResponseSize { size: u32 },

    #[error("TPM returned error code 0x{code:08X}")]
    ResponseCode { code: u32 },

    #[error("TPM response truncated at offset {offset}")]
    Truncated { offset: usize },
}
