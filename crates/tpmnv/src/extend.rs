// SPDX-License-Identifier: MIT OR Apache-2.0

//! The NV extend workflow
//!
//! Sequences payload loading, authorization resolution, and either the
//! real TPM2_NV_Extend or the commitment-hash dry run, then releases
//! every handle the invocation loaded.

use std::path::{Path, PathBuf};

use crate::auth::{authorizer_name, resolve, AuthTarget, AuthValue, ResolvedAuth};
use crate::cphash::{nv_extend_cp_hash, save_digest};
use crate::error::Error;
use crate::input::InputSource;
use crate::session::{load_session, AuxSessionPaths, Session};
use crate::{Tpm, MAX_NV_BUFFER_SIZE};

/// Everything one invocation needs; built in `main`, consumed once
#[derive(Debug)]
pub struct ExtendRequest {
    pub authorizer: AuthTarget,
    pub auth: AuthValue,
    pub input: InputSource,
    pub nv_index: u32,
    /// When set, compute the commitment hash instead of executing
    pub cp_hash: Option<PathBuf>,
    pub aux_sessions: AuxSessionPaths,
}

/// Run one extend invocation to completion
pub fn run(tpm: &mut Tpm, request: ExtendRequest) -> Result<(), Error> {
    let data = request.input.read(MAX_NV_BUFFER_SIZE)?;
    log::debug!("loaded {} byte payload", data.len());

    let resolved = resolve(tpm, &request.authorizer)?;

    if let Some(path) = &request.cp_hash {
        commitment_hash(tpm, &request, &resolved, &data, path)
    } else {
        execute(tpm, &request, &resolved, &data)
    }
}

/// Dry run: look up the handle Names, hash the would-be command, and
/// persist the digest. No session is opened.
fn commitment_hash(
    tpm: &mut Tpm,
    request: &ExtendRequest,
    resolved: &ResolvedAuth,
    data: &[u8],
    path: &Path,
) -> Result<(), Error> {
    let outcome = (|| -> Result<(), Error> {
        let auth_name = authorizer_name(tpm, &request.authorizer, resolved)?;
        let nv_name = tpm.nv_read_public(request.nv_index)?.name;
        let digest = nv_extend_cp_hash(&auth_name, &nv_name, data);
        log::debug!("commitment hash {}", hex::encode(&digest));
        save_digest(&digest, path)?;
        Ok(())
    })();

    conclude(outcome, vec![release_object(tpm, resolved)])
}

/// Live path: bind sessions, issue the extend, release everything
fn execute(
    tpm: &mut Tpm,
    request: &ExtendRequest,
    resolved: &ResolvedAuth,
    data: &[u8],
) -> Result<(), Error> {
    let mut opened: Vec<Session> = Vec::new();
    let outcome = bind_and_extend(tpm, request, resolved, data, &mut opened);

    // Release in fixed order: the authorization session, then the
    // auxiliary sessions in registration order, then a loaded object
    // context.
    let mut closes: Vec<Result<(), Error>> = opened
        .iter()
        .map(|session| session.close(tpm).map_err(Error::from))
        .collect();
    closes.push(release_object(tpm, resolved));

    conclude(outcome, closes)
}

fn bind_and_extend(
    tpm: &mut Tpm,
    request: &ExtendRequest,
    resolved: &ResolvedAuth,
    data: &[u8],
    opened: &mut Vec<Session>,
) -> Result<(), Error> {
    let primary = match &request.auth {
        AuthValue::Password(auth) => Session::Password { auth: auth.clone() },
        AuthValue::SessionFile(path) => load_session(tpm, path)?,
    };
    opened.push(primary);

    request.aux_sessions.bind(tpm, opened)?;

    let sessions: Vec<&Session> = opened.iter().collect();
    tpm.nv_extend(resolved.handle(), request.nv_index, data, &sessions)?;
    log::debug!("extended NV index 0x{:08x}", request.nv_index);

    Ok(())
}

fn release_object(tpm: &mut Tpm, resolved: &ResolvedAuth) -> Result<(), Error> {
    if resolved.is_loaded() {
        tpm.flush_context(resolved.handle()).map_err(Error::from)
    } else {
        Ok(())
    }
}

/// Failure precedence: the primary action's error wins; otherwise the
/// first release failure, in release order.
fn conclude(outcome: Result<(), Error>, closes: Vec<Result<(), Error>>) -> Result<(), Error> {
    match outcome {
        Err(err) => Err(err),
        Ok(()) => match closes.into_iter().find_map(Result::err) {
            Some(err) => Err(err),
            None => Ok(()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CommandError, ConfigError};

    fn command_err() -> Error {
        Error::from(CommandError::ResponseCode { code: 0x9A2 })
    }

    fn config_err() -> Error {
        Error::from(ConfigError::TooManyAuxSessions { limit: 2 })
    }

    #[test]
    fn success_with_clean_releases() {
        assert!(conclude(Ok(()), vec![Ok(()), Ok(())]).is_ok());
    }

    #[test]
    fn primary_failure_wins_over_release_failures() {
        let result = conclude(Err(config_err()), vec![Err(command_err())]);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn first_release_failure_surfaces_after_success() {
        let result = conclude(
            Ok(()),
            vec![Ok(()), Err(config_err()), Err(command_err())],
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
