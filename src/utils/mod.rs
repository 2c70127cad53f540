#[cfg(test)]
pub(crate) mod test_http;

use std::path::PathBuf;
use which::which;

use crate::errors::{AppError, Result};

/// Resolves an external tool given as a bare name (searched on `PATH`) or a path.
pub fn find_executable(name: &str) -> Result<PathBuf> {
    which(name).map_err(|e| {
        AppError::Config(format!(
            "{} executable not found ({}). Please ensure PostgreSQL client tools are installed and in your PATH.",
            name, e
        ))
    })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_executable_is_reported() {
        let result = find_executable("definitely-not-a-real-pg_dump-binary");
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_finds_executable_by_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let script = test_scripts::write_script(dir.path(), "tool", "exit 0");
        assert_eq!(find_executable(script.to_str().unwrap()).unwrap(), script);
    }
}
