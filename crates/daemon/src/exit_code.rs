// Consistent exit codes for autopushd.
//
//   0  = normal shutdown (interrupt)
//   1  = general error
//   2  = usage or configuration error
//   10 = git misconfigured or not runnable
//   13 = remote unreachable

use std::process;

use crate::config::ConfigError;
use crate::startup::PreflightError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    GitMisconfigured = 10,
    RemoteUnreachable = 13,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(preflight) = cause.downcast_ref::<PreflightError>() {
                return Self::from_preflight(preflight);
            }
            if cause.downcast_ref::<ConfigError>().is_some() {
                return Self::Usage;
            }
        }

        Self::Error
    }

    pub fn from_preflight(err: &PreflightError) -> Self {
        match err {
            PreflightError::GitUnavailable(_) | PreflightError::MissingIdentity { .. } => {
                Self::GitMisconfigured
            }
            PreflightError::RemoteUnreachable { .. } => Self::RemoteUnreachable,
        }
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code() as u8)
    }
}
