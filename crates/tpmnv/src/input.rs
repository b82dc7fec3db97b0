// SPDX-License-Identifier: MIT OR Apache-2.0

//! Payload loading
//!
//! The extend payload comes from a file or from standard input; `-`
//! (or no `-i` at all) selects standard input, matching the tpm2-tools
//! convention.

use std::io::Read;
use std::path::PathBuf;

use crate::error::IoError;

/// Where the extend payload comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Stdin,
    File(PathBuf),
}

impl InputSource {
    /// Interpret an `-i` argument; `-` and absence both mean standard
    /// input
    pub fn from_arg(arg: Option<&str>) -> InputSource {
        match arg {
            None | Some("-") => InputSource::Stdin,
            Some(path) => InputSource::File(PathBuf::from(path)),
        }
    }

    /// Read at most `max` bytes of payload. Shorter reads, including an
    /// empty payload, are fine.
    pub fn read(&self, max: usize) -> Result<Vec<u8>, IoError> {
        let mut data = Vec::new();
        match self {
            InputSource::Stdin => {
                std::io::stdin()
                    .lock()
                    .take(max as u64)
                    .read_to_end(&mut data)
                    .map_err(|source| IoError::ReadStdin { source })?;
            }
            InputSource::File(path) => {
                let file = std::fs::File::open(path).map_err(|source| IoError::ReadInput {
                    path: path.clone(),
                    source,
                })?;
                file.take(max as u64)
                    .read_to_end(&mut data)
                    .map_err(|source| IoError::ReadInput {
                        path: path.clone(),
                        source,
                    })?;
            }
        }
        Ok(data)
    }
}
