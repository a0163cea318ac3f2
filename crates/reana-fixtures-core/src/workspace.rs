//! Shared volume and workflow workspaces.
//!
//! Workflow workspaces live under `<root>/users/<user>/workflows/<workflow>`,
//! the layout the workflow engines expect on the shared volume.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use uuid::Uuid;

use crate::config::SharedVolumeConfig;
use crate::error::Result;

/// Build the workspace path of a user, or of one of their workflows.
pub fn build_workspace_path(user_id: Uuid, workflow_id: Option<Uuid>, root: &Path) -> PathBuf {
    let mut path = root
        .join("users")
        .join(user_id.to_string())
        .join("workflows");
    if let Some(workflow_id) = workflow_id {
        path.push(workflow_id.to_string());
    }
    path
}

/// A shared file system for a group of tests.
///
/// Either an existing directory (never deleted) or a temporary directory that
/// is removed on [`SharedVolume::close`] or when dropped.
#[derive(Debug)]
pub struct SharedVolume {
    path: PathBuf,
    temp: Option<TempDir>,
}

impl SharedVolume {
    /// Use the configured path when it exists, otherwise create a temporary
    /// directory.
    pub fn from_config(config: &SharedVolumeConfig) -> Result<Self> {
        match &config.path {
            Some(path) if path.exists() => {
                tracing::debug!(path = %path.display(), "Using existing shared volume");
                Ok(Self::existing(path))
            }
            _ => Self::temporary(&config.temp_prefix),
        }
    }

    /// Create a temporary shared volume.
    pub fn temporary(prefix: &str) -> Result<Self> {
        let temp = tempfile::Builder::new().prefix(prefix).tempdir()?;
        let path = temp.path().to_path_buf();
        tracing::debug!(path = %path.display(), "Created temporary shared volume");
        Ok(Self {
            path,
            temp: Some(temp),
        })
    }

    /// Wrap an existing directory.
    pub fn existing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            temp: None,
        }
    }

    /// Root of the shared volume.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the volume is removed on close.
    pub fn is_temporary(&self) -> bool {
        self.temp.is_some()
    }

    /// Create `<root>/<relative>` if needed and return it.
    ///
    /// An absolute `relative` path is used as is.
    pub fn sample_workflow_workspace(&self, relative: impl AsRef<Path>) -> Result<PathBuf> {
        let workspace = self.path.join(relative);
        if !workspace.exists() {
            std::fs::create_dir_all(&workspace)?;
        }
        Ok(workspace)
    }

    /// Create the workspace of a workflow owned by `user_id`.
    pub fn workflow_workspace(&self, user_id: Uuid, workflow_id: Uuid) -> Result<PathBuf> {
        let path = build_workspace_path(user_id, Some(workflow_id), &self.path);
        self.sample_workflow_workspace(path)
    }

    /// Remove the volume if it is temporary.
    pub fn close(self) -> Result<()> {
        if let Some(temp) = self.temp {
            tracing::debug!(path = %self.path.display(), "Removing temporary shared volume");
            temp.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_workspace_path() {
        let user = Uuid::nil();
        let workflow = Uuid::from_u128(1);
        let root = Path::new("/var/reana");

        assert_eq!(
            build_workspace_path(user, None, root),
            PathBuf::from("/var/reana/users/00000000-0000-0000-0000-000000000000/workflows")
        );
        assert_eq!(
            build_workspace_path(user, Some(workflow), root),
            PathBuf::from(
                "/var/reana/users/00000000-0000-0000-0000-000000000000/workflows/00000000-0000-0000-0000-000000000001"
            )
        );
    }

    #[test]
    fn test_temporary_volume_removed_on_close() {
        let volume = SharedVolume::temporary("reana").unwrap();
        let path = volume.path().to_path_buf();

        assert!(volume.is_temporary());
        assert!(path.exists());
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("reana"));

        volume.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_existing_volume_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let config = SharedVolumeConfig {
            path: Some(dir.path().to_path_buf()),
            ..Default::default()
        };

        let volume = SharedVolume::from_config(&config).unwrap();
        assert!(!volume.is_temporary());
        assert_eq!(volume.path(), dir.path());

        volume.close().unwrap();
        assert!(dir.path().exists());
    }

    #[test]
    fn test_missing_configured_path_falls_back_to_temporary() {
        let config = SharedVolumeConfig {
            path: Some(PathBuf::from("/definitely/not/a/reana/volume")),
            ..Default::default()
        };

        let volume = SharedVolume::from_config(&config).unwrap();
        assert!(volume.is_temporary());
    }

    #[test]
    fn test_sample_workflow_workspace() {
        let volume = SharedVolume::temporary("reana").unwrap();

        let relative = volume.sample_workflow_workspace("some/workspace").unwrap();
        assert!(relative.is_dir());
        assert!(relative.starts_with(volume.path()));

        // Absolute paths replace the root, as path joining does.
        let absolute = volume.path().join("absolute");
        assert_eq!(volume.sample_workflow_workspace(&absolute).unwrap(), absolute);

        // Creating an existing workspace is fine.
        volume.sample_workflow_workspace("some/workspace").unwrap();
    }

    #[test]
    fn test_workflow_workspace() {
        let volume = SharedVolume::temporary("reana").unwrap();
        let user = Uuid::new_v4();
        let workflow = Uuid::new_v4();

        let path = volume.workflow_workspace(user, workflow).unwrap();
        assert!(path.is_dir());
        assert!(path.ends_with(workflow.to_string()));
        assert_eq!(path, build_workspace_path(user, Some(workflow), volume.path()));
    }
}
