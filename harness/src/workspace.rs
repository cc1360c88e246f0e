//! Per-request build workspaces.

use {
    playground_runner_error::error::RunnerError,
    std::{
        fs, io,
        path::{Path, PathBuf},
    },
    trezoa_keypair::{read_keypair_file, write_keypair_file, Keypair},
};

/// Write a keypair file in the CLI's JSON byte-array format, creating parent
/// directories as needed.
pub fn write_keypair(keypair: &Keypair, path: &Path) -> Result<(), RunnerError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    write_keypair_file(keypair, path).map_err(|err| {
        RunnerError::UnknownExecutionError(format!(
            "Failed to write keypair {}: {err}",
            path.display()
        ))
    })?;
    Ok(())
}

pub fn read_keypair(path: &Path) -> Result<Keypair, RunnerError> {
    read_keypair_file(path).map_err(|err| {
        RunnerError::UnknownExecutionError(format!(
            "Invalid keypair file {}: {err}",
            path.display()
        ))
    })
}

/// Creates and removes isolated scratch directories under a base directory.
#[derive(Clone, Debug)]
pub struct WorkspaceManager {
    base_dir: PathBuf,
}

impl WorkspaceManager {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Create a fresh, uniquely named directory for one build of
    /// `template_id`. The base directory is created if needed.
    pub fn create(&self, template_id: &str) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.base_dir)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{template_id}-"))
            .tempdir_in(&self.base_dir)?;
        Ok(dir.into_path())
    }

    /// Recursively remove a workspace. Removing one that no longer exists is
    /// not an error.
    pub fn cleanup(&self, path: &Path) -> io::Result<()> {
        match fs::remove_dir_all(path) {
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            result => result,
        }
    }

    /// Create a workspace that removes itself when dropped.
    pub fn create_scoped(&self, template_id: &str) -> io::Result<Workspace> {
        let path = self.create(template_id)?;
        Ok(Workspace {
            manager: self.clone(),
            path,
        })
    }
}

/// A workspace directory owned for the duration of one request.
#[derive(Debug)]
pub struct Workspace {
    manager: WorkspaceManager,
    path: PathBuf,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(err) = self.manager.cleanup(&self.path) {
            log::warn!(
                "Failed to clean up workspace {}: {err}",
                self.path.display()
            );
        }
    }
}
