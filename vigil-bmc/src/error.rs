#![forbid(unsafe_code)]

use std::io;
use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;
use vigil_exec::ExecError;

pub const INSTALL_GUIDANCE: &str = "Install ESBMC from https://github.com/esbmc/esbmc, \
or point to it with --esbmc-path /path/to/esbmc or the ESBMC_PATH environment variable.";

#[derive(Debug, Error, Diagnostic)]
pub enum BmcError {
    #[error("model checker `{binary}` could not be started")]
    #[diagnostic(code(vigil::bmc::tool_invocation), help("{guidance}"))]
    ToolInvocation { binary: String, guidance: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Exec(ExecError),

    #[error("could not write {path}: {source}")]
    #[diagnostic(code(vigil::bmc::io))]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
