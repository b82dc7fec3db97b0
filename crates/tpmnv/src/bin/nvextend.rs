// SPDX-License-Identifier: MIT OR Apache-2.0

//! Extend (hash-chain) data into a TPM2 NV index
//!
//! Reads a payload from a file or standard input and chains it into an
//! extend-type NV index. With `--cphash` the command is not executed;
//! its commitment hash is computed and written to a file instead.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tpmnv::auth::{authorizer_for, parse_nv_index, AuthValue};
use tpmnv::extend::{run, ExtendRequest};
use tpmnv::input::InputSource;
use tpmnv::session::AuxSessionPaths;
use tpmnv::{Error, Tpm};

#[derive(Parser, Debug)]
#[command(
    name = "nvextend",
    about = "Extend (hash-chain) data into a TPM2 NV index",
    version
)]
struct Cli {
    /// Authorizing hierarchy or object: owner, platform, a raw handle,
    /// or a saved object context file; defaults to the index itself
    #[arg(short = 'C', long = "hierarchy", value_name = "REF")]
    hierarchy: Option<String>,

    /// Auth value for the authorizing principal (plain, str:, hex:, or
    /// session:FILE)
    #[arg(short = 'P', long = "auth", value_name = "AUTH")]
    auth: Option<String>,

    /// Payload file; `-` or omitted reads standard input
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    input: Option<String>,

    /// Compute the command's commitment hash, write it to FILE, and
    /// skip execution
    #[arg(long = "cphash", value_name = "FILE")]
    cphash: Option<PathBuf>,

    /// Auxiliary session file; may be given up to two times
    #[arg(short = 'S', long = "session", value_name = "FILE")]
    sessions: Vec<PathBuf>,

    /// TPM character device
    #[arg(long = "device", value_name = "PATH", default_value = "/dev/tpmrm0")]
    device: String,

    /// Target NV index; also the default authorization reference
    #[arg(value_name = "NV_INDEX", value_parser = parse_nv_index)]
    nv_index: u32,
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
    // Everything is validated before the device is touched.
    let aux_sessions = AuxSessionPaths::try_from(cli.sessions)?;
    let authorizer = authorizer_for(cli.hierarchy.as_deref(), cli.nv_index)?;
    let auth = match cli.auth.as_deref() {
        Some(value) => AuthValue::parse(value)?,
        None => AuthValue::default(),
    };

    let request = ExtendRequest {
        authorizer,
        auth,
        input: InputSource::from_arg(cli.input.as_deref()),
        nv_index: cli.nv_index,
        cp_hash: cli.cphash,
        aux_sessions,
    };

    let mut tpm = Tpm::open_path(&cli.device)?;
    run(&mut tpm, request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_argument_alone_suffices() {
        let cli = Cli::try_parse_from(["nvextend", "0x1500001"]).unwrap();
        assert_eq!(cli.nv_index, 0x0150_0001);
        assert!(cli.hierarchy.is_none());
        assert!(cli.cphash.is_none());
        assert!(cli.sessions.is_empty());
        assert_eq!(cli.device, "/dev/tpmrm0");
    }

    #[test]
    fn flag_surface() {
        let cli = Cli::try_parse_from([
            "nvextend",
            "-C",
            "owner",
            "-P",
            "hex:00ff",
            "-i",
            "data.bin",
            "-S",
            "first.ctx",
            "-S",
            "second.ctx",
            "--cphash",
            "out.digest",
            "0x1500001",
        ])
        .unwrap();

        assert_eq!(cli.hierarchy.as_deref(), Some("owner"));
        assert_eq!(cli.auth.as_deref(), Some("hex:00ff"));
        assert_eq!(cli.input.as_deref(), Some("data.bin"));
        assert_eq!(cli.cphash, Some(PathBuf::from("out.digest")));
        assert_eq!(
            cli.sessions,
            vec![PathBuf::from("first.ctx"), PathBuf::from("second.ctx")]
        );
    }

    #[test]
    fn index_argument_is_required_and_checked() {
        assert!(Cli::try_parse_from(["nvextend"]).is_err());
        assert!(Cli::try_parse_from(["nvextend", "0x81000001"]).is_err());
    }

    #[test]
    fn three_sessions_fail_before_any_tpm_call() {
        let cli = Cli::try_parse_from([
            "nvextend", "-S", "a.ctx", "-S", "b.ctx", "-S", "c.ctx", "0x1500001",
        ])
        .unwrap();
        assert!(matches!(invoke(cli), Err(Error::Config(_))));
    }
}
