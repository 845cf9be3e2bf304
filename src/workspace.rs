use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use nix::fcntl::{Flock, FlockArg};
use tracing::{debug, info};

use crate::workflow::ProvisionError;

/// Name of the scratch directory created inside the target path
pub const STAGING_DIR_NAME: &str = ".repo-creator";

/// Advisory lock file guarding a target path against concurrent runs
pub const LOCK_FILE_NAME: &str = ".repo-creator.lock";

/// Scratch directory that receives the clone before it is renamed
#[derive(Debug)]
pub struct StagingArea {
    target_path: PathBuf,
    dir: PathBuf,
}

impl StagingArea {
    pub fn path(&self) -> &Path {
        &self.dir
    }
}

/// The single directory produced by cloning into the staging area
#[derive(Debug)]
pub struct RepoHandle {
    path: PathBuf,
}

impl RepoHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Create the staging directory under `target_path`, refusing to reuse one
/// that already holds anything.
pub fn prepare(target_path: &Path) -> Result<StagingArea, ProvisionError> {
    let dir = target_path.join(STAGING_DIR_NAME);

    if dir.exists() {
        let entries = list_entries(&dir)?;
        if !entries.is_empty() {
            return Err(ProvisionError::Precondition(format!(
                "Files were found in the staging directory {}. This tool only works on a blank directory.",
                dir.display()
            )));
        }
    }

    fs::create_dir_all(&dir).map_err(|e| {
        ProvisionError::io(
            format!("Failed to create staging directory {}", dir.display()),
            e,
        )
    })?;
    debug!(path = %dir.display(), "workspace:staging ready");

    Ok(StagingArea {
        target_path: target_path.to_path_buf(),
        dir,
    })
}

/// Find the repository directory a clone produced. Exactly one directory
/// must be present; anything else is ambiguous and fails.
pub fn locate_clone(staging: &StagingArea) -> Result<RepoHandle, ProvisionError> {
    let mut entries = list_entries(&staging.dir)?;

    match entries.len() {
        0 => Err(ProvisionError::State(format!(
            "Clone did not create a repository directory in {}",
            staging.dir.display()
        ))),
        1 => {
            let path = entries.remove(0);
            if !path.is_dir() {
                return Err(ProvisionError::State(format!(
                    "Expected a cloned repository directory, found file {}",
                    path.display()
                )));
            }
            debug!(path = %path.display(), "workspace:located clone");
            Ok(RepoHandle { path })
        }
        _ => {
            entries.sort();
            let names: Vec<String> = entries
                .iter()
                .filter_map(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .collect();
            Err(ProvisionError::State(format!(
                "Expected exactly one cloned repository in {}, found {}: {}",
                staging.dir.display(),
                names.len(),
                names.join(", ")
            )))
        }
    }
}

/// Move the repository to `target_path/<project_name>` and remove the
/// emptied staging directory.
pub fn finalize(
    staging: StagingArea,
    repo: RepoHandle,
    project_name: &str,
) -> Result<PathBuf, ProvisionError> {
    let destination = staging.target_path.join(project_name);

    if destination.exists() {
        return Err(ProvisionError::io(
            format!(
                "Cannot move repository into {}: destination already exists",
                destination.display()
            ),
            std::io::Error::from(std::io::ErrorKind::AlreadyExists),
        ));
    }

    fs::rename(&repo.path, &destination).map_err(|e| {
        ProvisionError::io(
            format!(
                "Failed to move {} to {}",
                repo.path.display(),
                destination.display()
            ),
            e,
        )
    })?;

    let leftovers = list_entries(&staging.dir)?;
    if !leftovers.is_empty() {
        return Err(ProvisionError::io(
            format!(
                "Staging directory {} is not empty after moving the repository",
                staging.dir.display()
            ),
            std::io::Error::from(std::io::ErrorKind::DirectoryNotEmpty),
        ));
    }

    fs::remove_dir(&staging.dir).map_err(|e| {
        ProvisionError::io(
            format!(
                "Failed to remove staging directory {}",
                staging.dir.display()
            ),
            e,
        )
    })?;

    info!(path = %destination.display(), "workspace:finalized");
    Ok(destination)
}

/// Exclusive advisory lock on a target path, held for the whole run.
///
/// Dropping the guard releases the `flock`. The lock file is never removed,
/// so every run locks the same inode.
pub struct WorkspaceLock {
    _lock: Flock<File>,
}

impl WorkspaceLock {
    pub fn acquire(target_path: &Path) -> Result<Self, ProvisionError> {
        fs::create_dir_all(target_path).map_err(|e| {
            ProvisionError::io(
                format!("Failed to create target directory {}", target_path.display()),
                e,
            )
        })?;

        let path = target_path.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| {
                ProvisionError::io(format!("Failed to open lock file {}", path.display()), e)
            })?;

        let lock = Flock::lock(file, FlockArg::LockExclusiveNonblock).map_err(|(_, errno)| {
            ProvisionError::Precondition(format!(
                "Another repo-creator run is already using {} ({})",
                target_path.display(),
                errno
            ))
        })?;
        debug!(path = %path.display(), "workspace:lock acquired");

        Ok(Self { _lock: lock })
    }
}

fn list_entries(dir: &Path) -> Result<Vec<PathBuf>, ProvisionError> {
    let read_dir = fs::read_dir(dir).map_err(|e| {
        ProvisionError::io(format!("Failed to read directory {}", dir.display()), e)
    })?;

    read_dir
        .map(|entry| {
            entry.map(|e| e.path()).map_err(|e| {
                ProvisionError::io(format!("Failed to read directory {}", dir.display()), e)
            })
        })
        .collect()
}
