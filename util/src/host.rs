//! Host platform utility functions

use std::env;
use std::path::PathBuf;

/// Name of the environment variable holding the software root directory.
pub const SW_ROOT_ENV_VAR: &str = "WBC_SW_ROOT";

/// Get the software root directory from the `WBC_SW_ROOT` environment
/// variable.
///
/// Parameter files live in `<root>/params` and sessions are written to
/// `<root>/sessions`.
pub fn get_wbc_sw_root() -> Result<PathBuf, env::VarError> {
    env::var(SW_ROOT_ENV_VAR).map(PathBuf::from)
}
