//! Exit codes for the CLI.
//!
//! Stable across releases so cron jobs and scripts can branch on them.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    /// General/unspecified error
    GeneralError = 1,
    /// Invalid command-line arguments or input values
    InvalidArguments = 2,
    /// Settings file or database could not be opened
    SetupFailed = 3,
    /// The named document does not exist
    NotFound = 4,
    /// A sweep picked a unit but generating it failed
    GenerationFailed = 5,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitCode::Success => write!(f, "success"),
            ExitCode::GeneralError => write!(f, "general error"),
            ExitCode::InvalidArguments => write!(f, "invalid arguments"),
            ExitCode::SetupFailed => write!(f, "setup failed"),
            ExitCode::NotFound => write!(f, "not found"),
            ExitCode::GenerationFailed => write!(f, "generation failed"),
        }
    }
}
