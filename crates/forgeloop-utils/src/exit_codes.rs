//! Exit code constants for the forgeloop binary.
//!
//! # Exit Code Table
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Run completed successfully |
//! | 1 | `INTERNAL` | General/internal failure |
//! | 2 | `CLI_ARGS` | Invalid CLI arguments or configuration |
//! | 3 | `VERIFICATION_FAILED` | A stage failed and the run was aborted |
//! | 70 | `COLLABORATOR_FAILURE` | A collaborator endpoint failed |
//! | 130 | `ABORTED` | The run was cancelled |

/// Process exit code.
///
/// Use the named constants, and [`as_i32()`](Self::as_i32) to hand the value
/// to `std::process::exit()`.
///
/// ```rust
/// use forgeloop_utils::ExitCode;
///
/// assert_eq!(ExitCode::ABORTED.as_i32(), 130);
/// assert_eq!(ExitCode::SUCCESS, ExitCode::from_i32(0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Success - the run completed
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// Internal error - general failure
    pub const INTERNAL: ExitCode = ExitCode(1);

    /// CLI arguments error - invalid arguments or configuration
    pub const CLI_ARGS: ExitCode = ExitCode(2);

    /// A stage failed (typically the retry budget was exhausted)
    pub const VERIFICATION_FAILED: ExitCode = ExitCode(3);

    /// A generation or diagnostic endpoint failed
    pub const COLLABORATOR_FAILURE: ExitCode = ExitCode(70);

    /// Cancelled by the operator
    pub const ABORTED: ExitCode = ExitCode(130);

    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<i32> for ExitCode {
    fn from(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}
