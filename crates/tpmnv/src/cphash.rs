// SPDX-License-Identifier: MIT OR Apache-2.0

//! Commitment hash (cpHash) computation
//!
//! The commitment hash binds a later authorization to exact command
//! parameters without executing the command:
//!
//! ```text
//! cpHash = H(commandCode || Name(authHandle) || Name(nvIndex) || parameters)
//! ```
//!
//! For NV extend the parameters area is the payload as a
//! TPM2B_MAX_NV_BUFFER.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::IoError;
use crate::TpmCc;

/// Compute the SHA-256 commitment hash of an NV extend with the given
/// handle Names and payload
pub fn nv_extend_cp_hash(auth_name: &[u8], nv_name: &[u8], data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update((TpmCc::NvExtend as u32).to_be_bytes());
    hasher.update(auth_name);
    hasher.update(nv_name);
    hasher.update((data.len() as u16).to_be_bytes());
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Persist a digest as a marshalled TPM2B_DIGEST (big-endian length
/// prefix followed by the digest bytes)
pub fn save_digest(digest: &[u8], path: &Path) -> Result<(), IoError> {
    let mut out = Vec::with_capacity(2 + digest.len());
    out.extend_from_slice(&(digest.len() as u16).to_be_bytes());
    out.extend_from_slice(digest);
    std::fs::write(path, out).map_err(|source| IoError::WriteDigest {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commitment_hash_is_deterministic() {
        let auth_name = 0x4000_0001u32.to_be_bytes();
        let nv_name = [0x00, 0x0B, 0x11, 0x22, 0x33];

        let first = nv_extend_cp_hash(&auth_name, &nv_name, b"data");
        let second = nv_extend_cp_hash(&auth_name, &nv_name, b"data");
        assert_eq!(first, second);
        assert_eq!(first.len(), 32);

        let other = nv_extend_cp_hash(&auth_name, &nv_name, b"tada");
        assert_ne!(first, other);
    }

    #[test]
    fn commitment_hash_structure() {
        let auth_name = [0x40, 0x00, 0x00, 0x01];
        let nv_name = [0x00, 0x0B, 0xAA];
        let data = b"payload";

        let mut image = Vec::new();
        image.extend_from_slice(&0x0000_0136u32.to_be_bytes());
        image.extend_from_slice(&auth_name);
        image.extend_from_slice(&nv_name);
        image.extend_from_slice(&(data.len() as u16).to_be_bytes());
        image.extend_from_slice(data);
        let expected = Sha256::digest(&image);

        assert_eq!(
            nv_extend_cp_hash(&auth_name, &nv_name, data),
            expected.to_vec()
        );
    }

    #[test]
    fn digest_file_is_length_prefixed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.digest");
        let digest = [0x5Au8; 32];

        save_digest(&digest, &path).unwrap();

        let written = std::fs::read(&path).unwrap();
        assert_eq!(&written[0..2], &[0x00, 0x20]);
        assert_eq!(&written[2..], &digest);
    }

    #[test]
    fn digest_write_failure_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.digest");
        assert!(matches!(
            save_digest(&[0u8; 32], &path),
            Err(IoError::WriteDigest { .. })
        ));
    }
}
