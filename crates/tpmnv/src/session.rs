// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session and context management
//!
//! Sessions move between tool invocations as saved context files: the
//! raw marshalled TPMS_CONTEXT returned by TPM2_ContextSave. Loading a
//! file gives back a live session handle; whoever loads it owns it and
//! must flush it.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use sha2::{Digest, Sha256};

use crate::error::{AuthError, CommandError, ConfigError, Error, IoError};
use crate::{
    CommandBuffer, Tpm, TpmAlg, TpmCc, TpmSt, TPMA_SESSION_CONTINUE, TPM_RH_NULL, TPM_RS_PW,
    TPM_SE_HMAC, TPM_SE_POLICY, TPM_SE_TRIAL,
};

/// Most auxiliary sessions an NV command can carry beyond its
/// authorization session
pub const MAX_AUX_SESSIONS: usize = 2;

/// TPMS_CONTEXT header: sequence (8) + savedHandle (4) + hierarchy (4)
/// + contextBlob size (2)
const CONTEXT_HEADER_LEN: usize = 18;

/// Ordered, capacity-checked collection of auxiliary session file paths
#[derive(Debug, Default)]
pub struct AuxSessionPaths {
    paths: Vec<PathBuf>,
}

impl AuxSessionPaths {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one more session file; fails once the command's slots
    /// are exhausted
    pub fn register(&mut self, path: PathBuf) -> Result<(), ConfigError> {
        if self.paths.len() == MAX_AUX_SESSIONS {
            return Err(ConfigError::TooManyAuxSessions {
                limit: MAX_AUX_SESSIONS,
            });
        }
        self.paths.push(path);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Resolve every registered path to a live session, in registration
    /// order, appending to `bound`. Sessions bound before a failed load
    /// stay in `bound` so the caller can release them.
    pub fn bind(&self, tpm: &mut Tpm, bound: &mut Vec<Session>) -> Result<(), Error> {
        for path in &self.paths {
            bound.push(load_session(tpm, path)?);
        }
        Ok(())
    }
}

impl TryFrom<Vec<PathBuf>> for AuxSessionPaths {
    type Error = ConfigError;

    fn try_from(paths: Vec<PathBuf>) -> Result<Self, ConfigError> {
        let mut aux = AuxSessionPaths::new();
        for path in paths {
            aux.register(path)?;
        }
        Ok(aux)
    }
}

/// An authorization session as it appears in a command's authorization
/// area
#[derive(Debug)]
pub enum Session {
    /// Password authorization (TPM_RS_PW); no TPM-side state
    Password { auth: Vec<u8> },
    /// Session restored from a saved context; flushed on close
    Loaded { handle: u32 },
}

impl Session {
    /// Release whatever TPM-side state the session holds
    pub fn close(&self, tpm: &mut Tpm) -> Result<(), CommandError> {
        match self {
            Session::Password { .. } => Ok(()),
            Session::Loaded { handle } => tpm.flush_context(*handle),
        }
    }
}

/// Encode an authorization area: one TPMS_AUTH_COMMAND entry per
/// session, in slot order
pub(crate) fn encode_auth_area(sessions: &[&Session]) -> Vec<u8> {
    let mut area = Vec::new();
    for session in sessions {
        match session {
            Session::Password { auth } => {
                area.extend_from_slice(&TPM_RS_PW.to_be_bytes());
                area.extend_from_slice(&0u16.to_be_bytes()); // nonce
                area.push(0); // sessionAttributes
                area.extend_from_slice(&(auth.len() as u16).to_be_bytes());
                area.extend_from_slice(auth);
            }
            Session::Loaded { handle } => {
                area.extend_from_slice(&handle.to_be_bytes());
                area.extend_from_slice(&0u16.to_be_bytes()); // nonce
                // keep the session loaded; its owner flushes it
                area.push(TPMA_SESSION_CONTINUE);
                area.extend_from_slice(&0u16.to_be_bytes()); // hmac
            }
        }
    }
    area
}

/// Handle a saved context would restore to, without loading it
pub fn saved_context_handle(context: &[u8]) -> Option<u32> {
    if context.len() < CONTEXT_HEADER_LEN {
        return None;
    }
    Some(u32::from_be_bytes([
        context[8],
        context[9],
        context[10],
        context[11],
    ]))
}

fn is_session_handle(handle: u32) -> bool {
    // HMAC sessions live at 0x02xxxxxx, policy sessions at 0x03xxxxxx
    matches!(handle >> 24, 0x02 | 0x03)
}

/// Load a session from a saved context file
pub fn load_session(tpm: &mut Tpm, path: &Path) -> Result<Session, Error> {
    let context = std::fs::read(path).map_err(|source| IoError::ReadContext {
        path: path.to_path_buf(),
        source,
    })?;
    let saved = saved_context_handle(&context).ok_or_else(|| AuthError::TruncatedContext {
        path: path.to_path_buf(),
    })?;
    if !is_session_handle(saved) {
        return Err(AuthError::NotASessionContext {
            path: path.to_path_buf(),
            handle: saved,
        }
        .into());
    }
    let handle = tpm.context_load(&context)?;
    log::debug!("restored session 0x{handle:08x} from {}", path.display());
    Ok(Session::Loaded { handle })
}

/// Kind of session `startsession` can create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Hmac,
    Policy,
    Trial,
}

impl SessionKind {
    fn session_type(self) -> u8 {
        match self {
            SessionKind::Hmac => TPM_SE_HMAC,
            SessionKind::Policy => TPM_SE_POLICY,
            SessionKind::Trial => TPM_SE_TRIAL,
        }
    }
}

impl FromStr for SessionKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "hmac" => Ok(SessionKind::Hmac),
            "policy" => Ok(SessionKind::Policy),
            "trial" => Ok(SessionKind::Trial),
            _ => Err(ConfigError::UnknownSessionKind {
                value: value.to_string(),
            }),
        }
    }
}

impl Tpm {
    /// Start an unbound, unsalted authorization session with a SHA-256
    /// session hash. The caller owns the returned handle.
    pub fn start_auth_session(&mut self, kind: SessionKind) -> Result<u32, CommandError> {
        // Some TPMs require a non-empty nonceCaller; hash the current
        // time as a simple entropy source.
        let nonce = Sha256::digest(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
                .to_le_bytes(),
        );

        let command = CommandBuffer::new()
            .write_u32(TPM_RH_NULL) // tpmKey
            .write_u32(TPM_RH_NULL) // bind
            .write_tpm2b(&nonce[..16]) // nonceCaller
            .write_u16(0) // encryptedSalt size (no salt)
            .write_u8(kind.session_type())
            .write_u16(TpmAlg::Null as u16) // symmetric
            .write_u16(TpmAlg::Sha256 as u16) // authHash
            .finalize(TpmSt::NoSessions, TpmCc::StartAuthSession);

        let mut resp = self.transmit(&command)?;

        let session_handle = resp.read_u32()?;
        let _nonce_tpm = resp.read_tpm2b()?;

        Ok(session_handle)
    }

    /// Save a loaded session or object context; returns the marshalled
    /// TPMS_CONTEXT
    pub fn context_save(&mut self, handle: u32) -> Result<Vec<u8>, CommandError> {
        let command = CommandBuffer::new()
            .write_u32(handle)
            .finalize(TpmSt::NoSessions, TpmCc::ContextSave);
        let mut resp = self.transmit(&command)?;

        let len = resp.remaining();
        Ok(resp.read_bytes(len)?.to_vec())
    }

    /// Restore a previously saved context; returns the loaded handle
    pub fn context_load(&mut self, context: &[u8]) -> Result<u32, CommandError> {
        let command = CommandBuffer::new()
            .write_bytes(context)
            .finalize(TpmSt::NoSessions, TpmCc::ContextLoad);
        let mut resp = self.transmit(&command)?;

        resp.read_u32()
    }
}
