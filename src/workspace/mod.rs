// Local workspace for member payload files
//
// The CLI keeps JSON copies of what it sends and receives under an output
// directory with `create`, `response`, `update` and `current` subfolders.
// Payload files can be referenced by path or by bare name, in which case the
// relevant subfolders are searched.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Output directory layout used by the CLI
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    create_dir: PathBuf,
    response_dir: PathBuf,
    update_dir: PathBuf,
    current_dir: PathBuf,
}

impl Workspace {
    /// Open a workspace rooted at `root`, creating any missing folders
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let workspace = Self {
            create_dir: root.join("create"),
            response_dir: root.join("response"),
            update_dir: root.join("update"),
            current_dir: root.join("current"),
            root,
        };

        for dir in [
            &workspace.root,
            &workspace.create_dir,
            &workspace.response_dir,
            &workspace.update_dir,
            &workspace.current_dir,
        ] {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }

        debug!("Using workspace: {:?}", workspace.root);
        Ok(workspace)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Payloads built by `member create`
    pub fn create_dir(&self) -> &Path {
        &self.create_dir
    }

    /// Server responses to creates
    pub fn response_dir(&self) -> &Path {
        &self.response_dir
    }

    /// Update payloads
    pub fn update_dir(&self) -> &Path {
        &self.update_dir
    }

    /// Latest known member state
    pub fn current_dir(&self) -> &Path {
        &self.current_dir
    }

    /// Find the first readable JSON document named `name`
    ///
    /// `name` is used as-is when it is an existing file; otherwise each of
    /// `search_dirs` is tried in order. Files that fail to parse are skipped.
    pub fn find_json(&self, name: &str, search_dirs: &[&Path]) -> Result<Option<(PathBuf, Value)>> {
        let direct = PathBuf::from(name);
        let candidates: Vec<PathBuf> = if direct.is_file() {
            vec![direct]
        } else {
            search_dirs
                .iter()
                .map(|dir| dir.join(name))
                .filter(|path| path.is_file())
                .collect()
        };

        for path in candidates {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            match serde_json::from_str::<Value>(&content) {
                Ok(value) => return Ok(Some((path, value))),
                Err(e) => warn!("Skipping {:?}: not valid JSON ({})", path, e),
            }
        }

        Ok(None)
    }

    /// Write a value as pretty-printed JSON
    pub fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        let content = serde_json::to_string_pretty(value).context("Failed to serialize payload")?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        debug!("Wrote {:?}", path);
        Ok(())
    }
}

/// File name for a member's payloads: `first_last.json` in lower case
pub fn member_file_name(first: &str, last: &str) -> String {
    format!("{}_{}.json", first.to_lowercase(), last.to_lowercase())
}

/// Read a JSON object of member defaults
pub fn load_defaults<P: AsRef<Path>>(path: P) -> Result<Map<String, Value>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read defaults file: {}", path.display()))?;
    match serde_json::from_str::<Value>(&content)
        .with_context(|| format!("Failed to parse defaults file: {}", path.display()))?
    {
        Value::Object(map) => Ok(map),
        _ => anyhow::bail!("Defaults file {} must hold a JSON object", path.display()),
    }
}
