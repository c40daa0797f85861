//! Data directory resolution.

use std::path::{Path, PathBuf};

pub const DATA_DIR_ENV: &str = "APISCOUT_DATA_DIR";
const LOCAL_DIR: &str = ".apiscout";

/// Where apiscout keeps its database, blobs, gallery and directory.
#[derive(Debug, Clone, PartialEq)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join("apiscout.db")
    }

    pub fn blob_dir(&self) -> PathBuf {
        self.root.join("blobs")
    }

    pub fn gallery_dir(&self) -> PathBuf {
        self.root.join("gallery")
    }

    pub fn directory_dir(&self) -> PathBuf {
        self.root.join("directory")
    }
}

/// Resolve the data directory.
///
/// Priority: explicit flag, `APISCOUT_DATA_DIR`, `./.apiscout` if it exists,
/// then `~/.apiscout`.
pub fn resolve_data_dir(explicit: Option<&str>) -> DataDir {
    let env = std::env::var(DATA_DIR_ENV).ok();
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    resolve_from(explicit, env.as_deref(), &cwd, dirs::home_dir())
}

fn resolve_from(explicit: Option<&str>, env: Option<&str>, cwd: &Path, home: Option<PathBuf>) -> DataDir {
    if let Some(path) = explicit {
        return DataDir::new(PathBuf::from(path));
    }

    if let Some(path) = env.filter(|p| !p.is_empty()) {
        return DataDir::new(PathBuf::from(path));
    }

    let local = cwd.join(LOCAL_DIR);
    if local.is_dir() {
        return DataDir::new(local);
    }

    DataDir::new(home.unwrap_or_else(|| PathBuf::from(".")).join(LOCAL_DIR))
}
