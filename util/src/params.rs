//! Generic parameters functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::de::DeserializeOwned;
use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use thiserror::Error;
use toml;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An error that occurs during loading of a parameter file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("The software root environment variable (WBC_SW_ROOT) is not set")]
    SwRootNotSet,

    #[error("Cannot load the parameter file {0:?}: {1}")]
    FileLoadError(PathBuf, std::io::Error),

    #[error("Cannot read the parameter file {0:?}: {1}")]
    DeserialiseError(PathBuf, toml::de::Error)
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Get the full path of a file in the parameters directory.
pub fn param_file_path(param_file_path: &str) -> Result<PathBuf, LoadError> {
    let mut path = crate::host::get_wbc_sw_root()
        .map_err(|_| LoadError::SwRootNotSet)?;
    path.push("params");
    path.push(param_file_path);

    Ok(path)
}

/// Load a parameter file
///
/// The file path is relative to the `$WBC_SW_ROOT/params` directory
pub fn load<P>(param_file_path: &str) -> Result<P, LoadError> 
where
    P: DeserializeOwned
{
    load_from_path(self::param_file_path(param_file_path)?)
}

/// Load a parameter file from an explicit path.
pub fn load_from_path<P, F>(path: F) -> Result<P, LoadError>
where
    P: DeserializeOwned,
    F: AsRef<Path>
{
    let path = path.as_ref();

    // Load the file into a string
    let params_str = read_to_string(path)
        .map_err(|e| LoadError::FileLoadError(path.to_path_buf(), e))?;

    // Parse the string into the parameter struct
    from_str(path, &params_str)
}

/// Parse parameters from a TOML string. `origin` is only used to report
/// errors.
pub fn from_str<P>(origin: &Path, params_str: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned
{
    toml::from_str(params_str)
        .map_err(|e| LoadError::DeserialiseError(origin.to_path_buf(), e))
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct TestParams {
        cycle_period_s: f64,
        #[serde(default)]
        names: Vec<String>
    }

    #[test]
    fn test_from_str() {
        let p: TestParams = from_str(
            Path::new("inline"),
            "cycle_period_s = 0.02\nnames = [\"a\", \"b\"]"
        ).unwrap();

        assert_eq!(p.cycle_period_s, 0.02);
        assert_eq!(p.names, vec!["a", "b"]);

        let e = from_str::<TestParams>(Path::new("inline"), "names = 3");
        assert!(matches!(e, Err(LoadError::DeserialiseError(_, _))));
    }

    #[test]
    fn test_missing_file() {
        let e = load_from_path::<TestParams, _>("/definitely/not/a/file.toml");
        assert!(matches!(e, Err(LoadError::FileLoadError(_, _))));
    }
}
