// Process exit codes. Per-device failures never change the exit code.
use clvec_common::{ClvecError, ErrorKind};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_ENUMERATION_FAIL: i32 = 1;
pub const EXIT_CONFIG_FAIL: i32 = 2;

/// Exit code for an error that ended the command.
pub fn code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<ClvecError>().map(ClvecError::kind) {
        Some(ErrorKind::Config) => EXIT_CONFIG_FAIL,
        _ => EXIT_ENUMERATION_FAIL,
    }
}
