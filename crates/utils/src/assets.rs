use std::{env, path::PathBuf};

use directories::ProjectDirs;

const PROJECT_ROOT: &str = env!("CARGO_MANIFEST_DIR");
const DATA_DIR_ENV: &str = "BOUNTY_PIPE_DATA_DIR";

/// Standard filing structure within the data directory:
/// ```text
/// bounty-pipe/
/// ├── index.json          # versioned task index document
/// ├── config.json         # pipeline configuration
/// ├── cache/              # shared repository mirrors
/// │   └── metadata.json   # cache metadata document
/// ├── workspaces/         # per-task checkouts
/// └── runs/               # per-run summary reports
/// ```
pub fn data_dir() -> PathBuf {
    let path = if let Ok(custom_dir) = env::var(DATA_DIR_ENV) {
        PathBuf::from(custom_dir)
    } else if cfg!(debug_assertions) {
        PathBuf::from(PROJECT_ROOT).join("../../dev_assets")
    } else {
        ProjectDirs::from("dev", "bounty-pipe", "bounty-pipe")
            .expect("OS didn't give us a home directory")
            .data_dir()
            .to_path_buf()
    };

    if !path.exists() {
        std::fs::create_dir_all(&path).expect("Failed to create data directory");
    }

    path
}

pub fn index_path() -> PathBuf {
    data_dir().join("index.json")
}

pub fn config_path() -> PathBuf {
    data_dir().join("config.json")
}

pub fn cache_dir() -> PathBuf {
    data_dir().join("cache")
}

pub fn cache_metadata_path() -> PathBuf {
    cache_dir().join("metadata.json")
}

pub fn workspaces_dir() -> PathBuf {
    data_dir().join("workspaces")
}

pub fn runs_dir() -> PathBuf {
    data_dir().join("runs")
}
