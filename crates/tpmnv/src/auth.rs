// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authorization resolution
//!
//! Turns a command-line object reference and auth value into the
//! authorizing principal for an NV operation. References follow the
//! tpm2-tools conventions: hierarchy shorthands ("o", "owner", ...),
//! raw handles, or paths to saved object contexts.

use std::path::{Path, PathBuf};

use crate::error::{AuthError, CommandError, ConfigError, Error, IoError};
use crate::{
    CommandBuffer, Tpm, TpmCc, TpmSt, TPM_HT_NV_INDEX, TPM_RH_ENDORSEMENT, TPM_RH_OWNER,
    TPM_RH_PLATFORM,
};

/// A permanent hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hierarchy {
    Owner,
    Platform,
    Endorsement,
}

impl Hierarchy {
    pub fn handle(self) -> u32 {
        match self {
            Hierarchy::Owner => TPM_RH_OWNER,
            Hierarchy::Platform => TPM_RH_PLATFORM,
            Hierarchy::Endorsement => TPM_RH_ENDORSEMENT,
        }
    }
}

/// The kinds of principal that can authorize an NV extend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthTarget {
    Hierarchy(Hierarchy),
    /// The NV index authorizes itself with its own auth value
    NvIndex(u32),
    /// A persistent object
    Persistent(u32),
    /// A transient object restored from a saved context file
    SavedObject(PathBuf),
}

impl AuthTarget {
    /// Parse a reference: hierarchy shorthand, raw handle, or a path to
    /// a saved object context
    pub fn parse(reference: &str) -> Result<AuthTarget, AuthError> {
        match reference {
            "o" | "owner" => return Ok(AuthTarget::Hierarchy(Hierarchy::Owner)),
            "p" | "platform" => return Ok(AuthTarget::Hierarchy(Hierarchy::Platform)),
            "e" | "endorsement" => return Ok(AuthTarget::Hierarchy(Hierarchy::Endorsement)),
            _ => {}
        }

        let unknown = || AuthError::UnknownReference {
            reference: reference.to_string(),
        };

        if let Some(handle) = parse_handle(reference) {
            return match handle >> 24 {
                0x01 => Ok(AuthTarget::NvIndex(handle)),
                0x81 => Ok(AuthTarget::Persistent(handle)),
                0x40 => match handle {
                    TPM_RH_OWNER => Ok(AuthTarget::Hierarchy(Hierarchy::Owner)),
                    TPM_RH_PLATFORM => Ok(AuthTarget::Hierarchy(Hierarchy::Platform)),
                    TPM_RH_ENDORSEMENT => Ok(AuthTarget::Hierarchy(Hierarchy::Endorsement)),
                    _ => Err(unknown()),
                },
                _ => Err(unknown()),
            };
        }

        if Path::new(reference).exists() {
            Ok(AuthTarget::SavedObject(PathBuf::from(reference)))
        } else {
            Err(unknown())
        }
    }
}

/// Pick the authorization reference: an explicit `-C` argument, or the
/// target index itself when none was given
pub fn authorizer_for(reference: Option<&str>, nv_index: u32) -> Result<AuthTarget, AuthError> {
    match reference {
        Some(reference) => AuthTarget::parse(reference),
        None => Ok(AuthTarget::NvIndex(nv_index)),
    }
}

/// Auth value for the authorizing principal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthValue {
    /// Plaintext or hex-decoded password, possibly empty
    Password(Vec<u8>),
    /// A saved session context to use as the authorization session
    SessionFile(PathBuf),
}

impl Default for AuthValue {
    fn default() -> Self {
        AuthValue::Password(Vec::new())
    }
}

impl AuthValue {
    /// Parse a `-P` argument: bare string, `str:`, `hex:`, or
    /// `session:FILE`
    pub fn parse(value: &str) -> Result<AuthValue, AuthError> {
        if let Some(path) = value.strip_prefix("session:") {
            return Ok(AuthValue::SessionFile(PathBuf::from(path)));
        }
        if let Some(encoded) = value.strip_prefix("hex:") {
            return Ok(AuthValue::Password(hex::decode(encoded)?));
        }
        let plain = value.strip_prefix("str:").unwrap_or(value);
        Ok(AuthValue::Password(plain.as_bytes().to_vec()))
    }
}

/// An authorizing principal resolved to a live handle
#[derive(Debug)]
pub struct ResolvedAuth {
    handle: u32,
    /// Set when the handle is a transient loaded by this invocation;
    /// the invocation flushes it during teardown
    loaded: bool,
}

impl ResolvedAuth {
    pub fn handle(&self) -> u32 {
        self.handle
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

/// Handle for a hierarchy authorizing an NV operation. NV commands
/// accept owner and platform only.
fn nv_auth_handle(hierarchy: Hierarchy) -> Result<u32, AuthError> {
    match hierarchy {
        Hierarchy::Owner | Hierarchy::Platform => Ok(hierarchy.handle()),
        Hierarchy::Endorsement => Err(AuthError::HierarchyNotAllowed {
            hierarchy: "endorsement",
        }),
    }
}

/// Resolve a parsed reference to the handle that will authorize the
/// command, loading a saved object context when the reference names one
pub fn resolve(tpm: &mut Tpm, target: &AuthTarget) -> Result<ResolvedAuth, Error> {
    match target {
        AuthTarget::Hierarchy(hierarchy) => Ok(ResolvedAuth {
            handle: nv_auth_handle(*hierarchy)?,
            loaded: false,
        }),
        AuthTarget::NvIndex(handle) | AuthTarget::Persistent(handle) => Ok(ResolvedAuth {
            handle: *handle,
            loaded: false,
        }),
        AuthTarget::SavedObject(path) => {
            let context = std::fs::read(path).map_err(|source| IoError::ReadContext {
                path: path.clone(),
                source,
            })?;
            let handle = tpm.context_load(&context)?;
            log::debug!("restored object 0x{handle:08x} from {}", path.display());
            Ok(ResolvedAuth {
                handle,
                loaded: true,
            })
        }
    }
}

/// Name of the authorizing principal, as bound into authorization
/// digests. Permanent handles are their own Name; NV indices and
/// objects carry a digest-based Name read back from the TPM.
pub fn authorizer_name(
    tpm: &mut Tpm,
    target: &AuthTarget,
    resolved: &ResolvedAuth,
) -> Result<Vec<u8>, Error> {
    match target {
        AuthTarget::Hierarchy(hierarchy) => Ok(hierarchy.handle().to_be_bytes().to_vec()),
        AuthTarget::NvIndex(handle) => Ok(tpm.nv_read_public(*handle)?.name),
        AuthTarget::Persistent(_) | AuthTarget::SavedObject(_) => {
            Ok(tpm.read_public(resolved.handle())?.name)
        }
    }
}

/// Public area and Name of a loaded object
#[derive(Debug)]
pub struct ObjectPublic {
    pub public_area: Vec<u8>,
    pub name: Vec<u8>,
}

impl Tpm {
    /// Read the public area and Name of an object
    pub fn read_public(&mut self, object_handle: u32) -> Result<ObjectPublic, CommandError> {
        let command = CommandBuffer::new()
            .write_u32(object_handle)
            .finalize(TpmSt::NoSessions, TpmCc::ReadPublic);

        let mut resp = self.transmit(&command)?;

        // outPublic (TPM2B_PUBLIC), name (TPM2B_NAME), qualifiedName (TPM2B_NAME)
        let public_area = resp.read_tpm2b()?;
        let name = resp.read_tpm2b()?;
        let _qualified_name = resp.read_tpm2b()?;

        Ok(ObjectPublic { public_area, name })
    }
}

fn parse_handle(value: &str) -> Option<u32> {
    if let Some(digits) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        u32::from_str_radix(digits, 16).ok()
    } else if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        value.parse().ok()
    } else {
        None
    }
}

/// Parse the target NV index argument. Bare offsets below the NV handle
/// range are taken relative to it, so `1` means `0x01000001`.
pub fn parse_nv_index(argument: &str) -> Result<u32, ConfigError> {
    let invalid = || ConfigError::NotAnNvIndex {
        argument: argument.to_string(),
    };
    let raw = parse_handle(argument).ok_or_else(invalid)?;
    match raw >> 24 {
        0x00 => Ok(TPM_HT_NV_INDEX | raw),
        0x01 => Ok(raw),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_hierarchy_shorthands() {
        assert_eq!(
            AuthTarget::parse("o").unwrap(),
            AuthTarget::Hierarchy(Hierarchy::Owner)
        );
        assert_eq!(
            AuthTarget::parse("owner").unwrap(),
            AuthTarget::Hierarchy(Hierarchy::Owner)
        );
        assert_eq!(
            AuthTarget::parse("p").unwrap(),
            AuthTarget::Hierarchy(Hierarchy::Platform)
        );
        assert_eq!(
            AuthTarget::parse("endorsement").unwrap(),
            AuthTarget::Hierarchy(Hierarchy::Endorsement)
        );
    }

    #[test]
    fn parse_raw_handles() {
        assert_eq!(
            AuthTarget::parse("0x01500001").unwrap(),
            AuthTarget::NvIndex(0x0150_0001)
        );
        assert_eq!(
            AuthTarget::parse("0x81000001").unwrap(),
            AuthTarget::Persistent(0x8100_0001)
        );
        assert_eq!(
            AuthTarget::parse("0x40000001").unwrap(),
            AuthTarget::Hierarchy(Hierarchy::Owner)
        );
        assert_eq!(
            AuthTarget::parse("0x4000000C").unwrap(),
            AuthTarget::Hierarchy(Hierarchy::Platform)
        );
    }

    #[test]
    fn parse_rejects_unresolvable_references() {
        // a session-range handle is not an authorizing principal
        assert!(matches!(
            AuthTarget::parse("0x02000000"),
            Err(AuthError::UnknownReference { .. })
        ));
        assert!(matches!(
            AuthTarget::parse("0x40000007"),
            Err(AuthError::UnknownReference { .. })
        ));
        assert!(matches!(
            AuthTarget::parse("no/such/path.ctx"),
            Err(AuthError::UnknownReference { .. })
        ));
    }

    #[test]
    fn parse_saved_object_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"ctx").unwrap();
        let reference = file.path().to_str().unwrap();
        assert_eq!(
            AuthTarget::parse(reference).unwrap(),
            AuthTarget::SavedObject(file.path().to_path_buf())
        );
    }

    #[test]
    fn index_is_its_own_authorizer_by_default() {
        assert_eq!(
            authorizer_for(None, 0x0150_0001).unwrap(),
            AuthTarget::NvIndex(0x0150_0001)
        );
        assert_eq!(
            authorizer_for(Some("owner"), 0x0150_0001).unwrap(),
            AuthTarget::Hierarchy(Hierarchy::Owner)
        );
    }

    #[test]
    fn endorsement_cannot_authorize_nv() {
        assert!(matches!(
            nv_auth_handle(Hierarchy::Endorsement),
            Err(AuthError::HierarchyNotAllowed { .. })
        ));
        assert_eq!(nv_auth_handle(Hierarchy::Owner).unwrap(), TPM_RH_OWNER);
        assert_eq!(
            nv_auth_handle(Hierarchy::Platform).unwrap(),
            TPM_RH_PLATFORM
        );
    }

    #[test]
    fn nv_index_argument_forms() {
        assert_eq!(parse_nv_index("0x1500001").unwrap(), 0x0150_0001);
        assert_eq!(parse_nv_index("0x01500001").unwrap(), 0x0150_0001);
        // bare offsets are relative to the NV handle range
        assert_eq!(parse_nv_index("1").unwrap(), 0x0100_0001);
        assert!(parse_nv_index("0x81000001").is_err());
        assert!(parse_nv_index("junk").is_err());
    }

    #[test]
    fn auth_value_forms() {
        assert_eq!(
            AuthValue::parse("secret").unwrap(),
            AuthValue::Password(b"secret".to_vec())
        );
        assert_eq!(
            AuthValue::parse("str:secret").unwrap(),
            AuthValue::Password(b"secret".to_vec())
        );
        assert_eq!(
            AuthValue::parse("hex:0a0B").unwrap(),
            AuthValue::Password(vec![0x0A, 0x0B])
        );
        assert!(matches!(
            AuthValue::parse("hex:zz"),
            Err(AuthError::BadHexAuth(_))
        ));
        assert_eq!(
            AuthValue::parse("session:sess.ctx").unwrap(),
            AuthValue::SessionFile(PathBuf::from("sess.ctx"))
        );
        assert_eq!(AuthValue::default(), AuthValue::Password(Vec::new()));
    }
}
