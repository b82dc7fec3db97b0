// SPDX-License-Identifier: MIT OR Apache-2.0

//! Start a TPM2 authorization session and save its context to a file
//!
//! The saved context is consumed by `nvextend` through `-S` (auxiliary
//! session) or `-P session:FILE` (authorization session).

use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use clap::Parser;
use tpmnv::session::SessionKind;
use tpmnv::{Error, IoError, Tpm};

#[derive(Parser, Debug)]
#[command(
    name = "startsession",
    about = "Start a TPM2 authorization session and save its context",
    version
)]
struct Cli {
    /// Session kind: policy, hmac, or trial
    #[arg(long = "type", value_name = "KIND", default_value = "policy", value_parser = SessionKind::from_str)]
    kind: SessionKind,

    /// TPM character device
    #[arg(long = "device", value_name = "PATH", default_value = "/dev/tpmrm0")]
    device: String,

    /// Where to write the saved session context
    #[arg(value_name = "OUT_FILE")]
    output: PathBuf,
}

fn main() -> ExitCode {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let cli = Cli::parse();
    match invoke(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn invoke(cli: Cli) -> Result<(), Error> {
    let mut tpm = Tpm::open_path(&cli.device)?;

    let handle = tpm.start_auth_session(cli.kind)?;

    let context = match tpm.context_save(handle) {
        Ok(context) => context,
        Err(err) => {
            tpm.flush_context(handle).ok();
            return Err(err.into());
        }
    };

    if let Err(source) = std::fs::write(&cli.output, context) {
        tpm.flush_context(handle).ok();
        return Err(IoError::WriteContext {
            path: cli.output.clone(),
            source,
        }
        .into());
    }

    log::info!("session 0x{handle:08x} saved to {}", cli.output.display());
    Ok(())
}
