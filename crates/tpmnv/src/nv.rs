// SPDX-License-Identifier: MIT OR Apache-2.0

//! NV (Non-Volatile) index operations

use crate::error::CommandError;
use crate::session::{encode_auth_area, Session};
use crate::{CommandBuffer, Tpm, TpmCc, TpmSt};

/// NV index public information
#[derive(Debug)]
pub struct NvPublicInfo {
    pub nv_index: u32,
    pub name_alg: u16,
    pub attributes: u32,
    pub auth_policy: Vec<u8>,
    pub data_size: u16,
    pub name: Vec<u8>,
}

impl Tpm {
    /// Get NV index public information, including the index Name used
    /// in authorization digests
    pub fn nv_read_public(&mut self, nv_index: u32) -> Result<NvPublicInfo, CommandError> {
        let command = CommandBuffer::new()
            .write_u32(nv_index) // nvIndex
            .finalize(TpmSt::NoSessions, TpmCc::NvReadPublic);
        let mut resp = self.transmit(&command)?;

        // nvPublic (TPM2B_NV_PUBLIC)
        let _nv_public_size = resp.read_u16()? as usize;

        // TPMS_NV_PUBLIC
        let nv_index_ret = resp.read_u32()?;
        let name_alg = resp.read_u16()?;
        let attributes = resp.read_u32()?;

        // authPolicy (TPM2B_DIGEST)
        let auth_policy = resp.read_tpm2b()?;

        let data_size = resp.read_u16()?;

        // nvName (TPM2B_NAME)
        let name = resp.read_tpm2b()?;

        Ok(NvPublicInfo {
            nv_index: nv_index_ret,
            name_alg,
            attributes,
            auth_policy,
            data_size,
            name,
        })
    }

    /// Hash-chain data into an NV index: new = H(old || data)
    ///
    /// `sessions` fills the authorization area in slot order. The first
    /// entry authorizes `auth_handle`; the remaining entries are
    /// auxiliary sessions.
    pub fn nv_extend(
        &mut self,
        auth_handle: u32,
        nv_index: u32,
        data: &[u8],
        sessions: &[&Session],
    ) -> Result<(), CommandError> {
        let command = build_nv_extend(auth_handle, nv_index, data, sessions);
        self.transmit(&command)?;

        Ok(())
    }
}

pub(crate) fn build_nv_extend(
    auth_handle: u32,
    nv_index: u32,
    data: &[u8],
    sessions: &[&Session],
) -> Vec<u8> {
    let area = encode_auth_area(sessions);
    CommandBuffer::new()
        .write_u32(auth_handle)
        .write_u32(nv_index)
        .write_u32(area.len() as u32) // authorizationSize
        .write_bytes(&area)
        .write_tpm2b(data) // data (TPM2B_MAX_NV_BUFFER)
        .finalize(TpmSt::Sessions, TpmCc::NvExtend)
}
