//! Build directory staging
//!
//! Each invocation gets its own build root and destdir under the
//! configured work root. Paths embed a fresh UUID, so two invocations of
//! the same recipe can never collide.

use kiln_errors::{Error, RunError};
use kiln_types::Recipe;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// Creates isolated build contexts under a work root
#[derive(Debug, Clone)]
pub struct Stager {
    work_root: PathBuf,
}

/// Per-invocation working directories and subprocess environment.
///
/// Owned exclusively by one invocation. The directories live until
/// `release()` is called; callers decide whether to release or retain
/// based on the outcome.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Working directory for all phase commands
    pub build_root: PathBuf,
    /// Staging root that `install` writes into
    pub destdir: PathBuf,
    /// Variables merged over the process environment for every command
    pub env: HashMap<String, String>,
    root: PathBuf,
}

impl Stager {
    #[must_use]
    pub fn new(work_root: impl Into<PathBuf>) -> Self {
        Self {
            work_root: work_root.into(),
        }
    }

    /// Create fresh build and staging directories for one invocation
    ///
    /// # Errors
    ///
    /// Returns `StageFailed` if the directories cannot be created or
    /// already exist (residual state).
    pub async fn prepare(
        &self,
        recipe: &Recipe,
        prefix: &str,
        jobs: usize,
    ) -> Result<BuildContext, Error> {
        let root = self
            .work_root
            .join(format!("{}-{}", recipe.name, Uuid::new_v4()));

        if root.exists() {
            return Err(RunError::StageFailed {
                message: format!("directory {} already exists", root.display()),
            }
            .into());
        }

        let build_root = root.join("build");
        let destdir = root.join("destdir");

        for dir in [&build_root, &destdir] {
            fs::create_dir_all(dir).await.map_err(|e| RunError::StageFailed {
                message: format!("failed to create {}: {e}", dir.display()),
            })?;
        }

        let mut env = HashMap::new();
        env.insert("NAME".to_string(), recipe.name.clone());
        env.insert("VERSION".to_string(), recipe.version.clone());
        env.insert("PREFIX".to_string(), prefix.to_string());
        env.insert("DESTDIR".to_string(), destdir.display().to_string());
        env.insert("JOBS".to_string(), jobs.to_string());

        let context = BuildContext {
            build_root,
            destdir,
            env,
            root,
        };
        context.check_isolation()?;
        Ok(context)
    }
}

impl BuildContext {
    /// Root of the per-invocation directory tree
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Delete the invocation's directory tree
    ///
    /// # Errors
    ///
    /// Returns an error if removal fails for a reason other than the tree
    /// already being gone.
    pub async fn release(&self) -> Result<(), Error> {
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io_with_path(&e, &self.root)),
        }
    }

    /// The staging root must never alias the live filesystem root or the
    /// build root.
    fn check_isolation(&self) -> Result<(), Error> {
        if self.destdir == Path::new("/") || self.destdir == self.build_root {
            return Err(RunError::StageFailed {
                message: format!("destdir {} is not isolated", self.destdir.display()),
            }
            .into());
        }
        Ok(())
    }
}
