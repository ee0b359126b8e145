use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Directory holding Orchestra state for a project: `<workdir>/.claude/orchestra`.
/// Created on first use.
pub fn orchestra_dir(workdir: &Path) -> Result<PathBuf> {
    let dir = workdir.join(".claude").join("orchestra");
    if !dir.exists() {
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    Ok(dir)
}

/// Typed JSON config file for one extension, e.g.
/// `.claude/orchestra/task.json`. A missing file reads as the type's
/// `Default` — state simply hasn't been written yet.
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn for_extension(workdir: &Path, extension: &str) -> Result<Self> {
        let dir = orchestra_dir(workdir)?;
        Ok(Self {
            path: dir.join(format!("{extension}.json")),
        })
    }

    pub fn load<T: DeserializeOwned + Default>(&self) -> Result<T> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("parsing {}", self.path.display())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(e).with_context(|| format!("reading {}", self.path.display())),
        }
    }

    pub fn save<T: Serialize>(&self, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value).context("serializing config")?;
        fs::write(&self.path, json).with_context(|| format!("writing {}", self.path.display()))
    }
}
