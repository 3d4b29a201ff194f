use std::path::{Path, PathBuf};

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable that overrides the data file location.
pub const DATA_FILE_ENV: &str = "PILLTRACK_DATA";

/// How often the daemon re-evaluates due state.
pub const DEFAULT_POLL_SECS: u64 = 60;

pub fn default_log_filter() -> &'static str {
    "pilltrack=info"
}

/// Default location of the medication database: `~/.pilltrack.json`.
///
/// Falls back to the working directory when no home directory is found.
pub fn default_data_file() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".pilltrack.json")
}

/// Resolve the data file: explicit flag, then `PILLTRACK_DATA`, then default.
pub fn resolve_data_file(flag: Option<&Path>) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }

    match std::env::var_os(DATA_FILE_ENV) {
        Some(value) if !value.is_empty() => PathBuf::from(value),
        _ => default_data_file(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_file_is_hidden_json() {
        let path = default_data_file();
        assert_eq!(path.file_name().unwrap(), ".pilltrack.json");
    }

    #[test]
    fn flag_wins_over_everything() {
        let path = resolve_data_file(Some(Path::new("/tmp/meds.json")));
        assert_eq!(path, PathBuf::from("/tmp/meds.json"));
    }

    #[test]
    fn log_filter_targets_crate() {
        assert!(default_log_filter().starts_with("pilltrack"));
    }
}
