//! `.env` style key=value file parsing
//!
//! Accepts `#` comments, blank lines, an optional `export` prefix and single
//! or double quoted values. Lines without `=` are skipped.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Flat key/value configuration
pub type EnvMap = BTreeMap<String, String>;

/// Parse env file contents
pub fn parse_env(contents: &str) -> EnvMap {
    let mut vars = EnvMap::new();

    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line = line
            .strip_prefix("export ")
            .map(str::trim_start)
            .unwrap_or(line);

        let Some((key, value)) = line.split_once('=') else {
            warn!("Skipping env line {}: no '=' found", idx + 1);
            continue;
        };

        let key = key.trim();
        if key.is_empty() {
            warn!("Skipping env line {}: empty key", idx + 1);
            continue;
        }

        vars.insert(key.to_string(), parse_value(value.trim()));
    }

    vars
}

fn parse_value(raw: &str) -> String {
    for quote in ['"', '\''] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return raw[1..raw.len() - 1].to_string();
        }
    }

    // Unquoted values may carry a trailing comment
    match raw.find(" #") {
        Some(pos) => raw[..pos].trim_end().to_string(),
        None => raw.to_string(),
    }
}

/// Read and parse an env file
pub fn read_env_file(path: &Path) -> Result<EnvMap> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        Error::ConfigError(format!("Cannot read env file {}: {}", path.display(), e))
    })?;
    let vars = parse_env(&contents);
    debug!("Loaded {} variable(s) from {}", vars.len(), path.display());
    Ok(vars)
}

/// Build the configuration map from an env file and the process environment.
///
/// An explicit `env_file` must exist. Without one, `.env` in the working
/// directory is used when present. Process variables win over file values.
pub fn load_env(env_file: Option<&Path>) -> Result<EnvMap> {
    let mut vars = match env_file {
        Some(path) => read_env_file(path)?,
        None => {
            let default = Path::new(".env");
            if default.is_file() {
                read_env_file(default)?
            } else {
                EnvMap::new()
            }
        }
    };

    vars.extend(std::env::vars());
    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_env_basic() {
        let vars = parse_env(
            "# node settings\n\
             RPC_PORT=8545\n\
             \n\
             export PROTOCOL=evm\n\
             PUBLIC_RPC=\"https://eth.example.org\"\n\
             CONTAINER='geth'\n",
        );
        assert_eq!(vars.get("RPC_PORT").map(String::as_str), Some("8545"));
        assert_eq!(vars.get("PROTOCOL").map(String::as_str), Some("evm"));
        assert_eq!(
            vars.get("PUBLIC_RPC").map(String::as_str),
            Some("https://eth.example.org")
        );
        assert_eq!(vars.get("CONTAINER").map(String::as_str), Some("geth"));
    }

    #[test]
    fn test_parse_env_skips_invalid_lines() {
        let vars = parse_env("not a pair\n=nokey\nBLOCK_LAG=3\n");
        assert_eq!(vars.len(), 1);
        assert_eq!(vars.get("BLOCK_LAG").map(String::as_str), Some("3"));
    }

    #[test]
    fn test_parse_env_inline_comment_and_equals_in_value() {
        let vars = parse_env("SAMPLE_SECS=5 # seconds\nPUBLIC_RPC=http://h/?a=b\n");
        assert_eq!(vars.get("SAMPLE_SECS").map(String::as_str), Some("5"));
        assert_eq!(
            vars.get("PUBLIC_RPC").map(String::as_str),
            Some("http://h/?a=b")
        );
    }

    #[test]
    fn test_quoted_value_keeps_hash() {
        let vars = parse_env("TOKEN=\"abc #def\"\n");
        assert_eq!(vars.get("TOKEN").map(String::as_str), Some("abc #def"));
    }

    #[test]
    fn test_read_env_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "RPC_PORT=9545").unwrap();
        writeln!(file, "export BLOCK_LAG=4").unwrap();

        let vars = read_env_file(file.path()).unwrap();
        assert_eq!(vars.get("RPC_PORT").map(String::as_str), Some("9545"));
        assert_eq!(vars.get("BLOCK_LAG").map(String::as_str), Some("4"));
    }

    #[test]
    fn test_missing_explicit_env_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_env(Some(&dir.path().join("missing.env"))).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }
}
