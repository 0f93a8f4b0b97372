// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exit-code discipline: 0 success, 1 domain failure, 2 transport failure.

use apc_daemon::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    /// The daemon rejected the request (structured error)
    #[error("{0}")]
    Domain(String),
    /// The daemon could not be reached or the wire broke
    #[error("transport: {0}")]
    Transport(String),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Domain(_) => 1,
            CliError::Transport(_) => 2,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, CliError::Transport(_))
    }
}

impl From<ProtocolError> for CliError {
    fn from(e: ProtocolError) -> Self {
        CliError::Transport(e.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        domain = { CliError::Domain("unknown session".to_string()), 1 },
        transport = { CliError::Transport("refused".to_string()), 2 },
    )]
    fn exit_codes(error: CliError, code: u8) {
        assert_eq!(error.exit_code(), code);
    }
}
