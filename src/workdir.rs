//! `.versioning/`-bound working directories.
//!
//! Grounded on the teacher's root module layering (`backup`/`client`
//! over `pbs-datastore`) and the status/diff shape of
//! `proxmox-backup-client/src/snapshot.rs`, adapted from a client talking
//! to a remote server down to a local controller calling straight into an
//! in-process [`rvn_datastore::Repository`]. `init`/`open`/`commit`/
//! `status`/`update`/`delete` are the only operations a CLI, file-watch
//! daemon or FUSE mount needs from this layer (spec §4.10); everything
//! content-addressed or transactional lives one level down.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use rvn_api_types::ReversionError;
use rvn_datastore::{Config, Repository, Snapshot, StorageProvider, Timeline};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::ignore::IgnoreSet;

const METADATA_DIR_NAME: &str = ".versioning";
const REPOSITORY_DIR_NAME: &str = "repository";
const CONFIG_FILE_NAME: &str = "config";
const IGNORE_FILE_NAME: &str = "ignore";

/// The persisted contents of `.versioning/config`: which timeline in the
/// embedded repository this directory is bound to.
#[derive(Debug, Serialize, Deserialize)]
struct Binding {
    timeline_id: Uuid,
}

/// A filesystem directory bound to one timeline in a repository embedded
/// under `<root>/.versioning/repository/`.
pub struct WorkDirectory {
    root: PathBuf,
    repo: Arc<Repository>,
    timeline: Timeline,
    ignore: IgnoreSet,
}

impl WorkDirectory {
    fn metadata_dir(root: &Path) -> PathBuf {
        root.join(METADATA_DIR_NAME)
    }

    /// Creates a fresh working directory at `root`: a `.versioning/`
    /// directory holding a brand-new repository (via `provider`) and a
    /// brand-new timeline. Fails with `AlreadyAWorkDir` if `root` already
    /// has a `.versioning/` directory.
    pub fn init(
        root: impl Into<PathBuf>,
        provider: &dyn StorageProvider,
        repository_config: Config,
    ) -> Result<Self> {
        let root = root.into();
        let meta_dir = Self::metadata_dir(&root);
        if meta_dir.is_dir() {
            return Err(ReversionError::AlreadyAWorkDir {
                path: root.display().to_string(),
            }
            .into());
        }

        fs::create_dir_all(&root)
            .with_context(|| format!("unable to create working directory {root:?}"))?;
        rvn_tools::fs::create_path(&meta_dir, 0o755)?;

        let repo = provider.create(&meta_dir.join(REPOSITORY_DIR_NAME), repository_config)?;
        let timeline = repo.create_timeline()?;

        let binding = Binding {
            timeline_id: timeline.id(),
        };
        rvn_tools::fs::replace_file(
            meta_dir.join(CONFIG_FILE_NAME),
            serde_json::to_string_pretty(&binding)?.as_bytes(),
            true,
        )?;
        rvn_tools::fs::replace_file(meta_dir.join(IGNORE_FILE_NAME), b"", true)?;

        Ok(WorkDirectory {
            root,
            repo,
            timeline,
            ignore: IgnoreSet::default(),
        })
    }

    /// Loads the binding at `root`. Fails with `NotAWorkDir` if there is
    /// no `.versioning/` directory there, `InvalidRepository` if one
    /// exists but its embedded repository or binding files don't parse.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let meta_dir = Self::metadata_dir(&root);
        if !meta_dir.is_dir() {
            return Err(ReversionError::NotAWorkDir {
                path: root.display().to_string(),
            }
            .into());
        }

        let repo = Repository::open(meta_dir.join(REPOSITORY_DIR_NAME)).map_err(|err| {
            ReversionError::invalid_repository(root.display().to_string(), err.to_string())
        })?;

        let binding_raw = rvn_tools::fs::read_optional_string(meta_dir.join(CONFIG_FILE_NAME))?
            .ok_or_else(|| {
                ReversionError::invalid_repository(root.display().to_string(), "missing binding config file")
            })?;
        let binding: Binding = serde_json::from_str(&binding_raw).map_err(|err| {
            ReversionError::invalid_repository(
                root.display().to_string(),
                format!("unreadable binding config: {err}"),
            )
        })?;

        let timeline = repo.timeline(binding.timeline_id)?.ok_or_else(|| {
            ReversionError::invalid_repository(
                root.display().to_string(),
                format!("bound timeline {} does not exist in the repository", binding.timeline_id),
            )
        })?;

        let ignore_raw = rvn_tools::fs::read_optional_string(meta_dir.join(IGNORE_FILE_NAME))?.unwrap_or_default();
        let ignore = IgnoreSet::parse(&ignore_raw)?;

        Ok(WorkDirectory {
            root,
            repo,
            timeline,
            ignore,
        })
    }

    /// Walks up from `start` (inclusive) looking for a `.versioning/`
    /// directory, opening the first one found.
    pub fn open_from_descendant(start: impl AsRef<Path>) -> Result<Self> {
        let mut current = start.as_ref();
        loop {
            if Self::metadata_dir(current).is_dir() {
                return Self::open(current);
            }
            match current.parent() {
                Some(parent) => current = parent,
                None => {
                    return Err(ReversionError::NotAWorkDir {
                        path: start.as_ref().display().to_string(),
                    }
                    .into())
                }
            }
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn repository(&self) -> &Arc<Repository> {
        &self.repo
    }

    pub fn ignore(&self) -> &IgnoreSet {
        &self.ignore
    }

    /// Replaces and persists the ignore matcher set.
    pub fn set_ignore(&mut self, ignore: IgnoreSet) -> Result<()> {
        rvn_tools::fs::replace_file(
            Self::metadata_dir(&self.root).join(IGNORE_FILE_NAME),
            ignore.serialize().as_bytes(),
            true,
        )?;
        self.ignore = ignore;
        Ok(())
    }

    /// Removes the `.versioning/` metadata directory, leaving the
    /// directory's current file contents untouched.
    pub fn delete(self) -> Result<()> {
        let meta_dir = Self::metadata_dir(&self.root);
        fs::remove_dir_all(&meta_dir).with_context(|| format!("unable to remove {meta_dir:?}"))
    }

    /// Every file under the given relative roots (the whole tree if
    /// `under` is empty) that `self.ignore` does not exclude, as
    /// forward-slash relative paths. Nonexistent roots are skipped
    /// rather than erroring, so a caller can pass paths from a commit
    /// request that no longer exist on disk.
    fn scan_tracked_files(&self, under: &[PathBuf]) -> Result<BTreeSet<String>> {
        let mut out = BTreeSet::new();
        let roots: Vec<PathBuf> = if under.is_empty() {
            vec![self.root.clone()]
        } else {
            under.iter().map(|p| self.root.join(p)).collect()
        };

        for start in roots {
            if !start.exists() {
                continue;
            }
            for entry in WalkDir::new(&start).into_iter().filter_map(|e| e.ok()) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let relative = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
                if self.ignore.is_ignored(relative) {
                    continue;
                }
                out.insert(path_to_key(relative));
            }
        }
        Ok(out)
    }

    /// The most recent snapshot on this directory's timeline, if any
    /// snapshot has been created yet.
    fn latest_snapshot(&self) -> Result<Option<Snapshot>> {
        Ok(self.timeline.list_snapshots()?.into_iter().next())
    }

    /// Paths that exist on disk and either have no version in the latest
    /// snapshot or whose current content digest differs from it. Missing
    /// files (recorded in the latest snapshot but absent on disk) are not
    /// reported.
    pub fn status(&self) -> Result<BTreeSet<String>> {
        let tracked = self.scan_tracked_files(&[])?;
        let latest = self.latest_snapshot()?;
        let algorithm = self.repo.hash_algorithm();

        let mut modified = BTreeSet::new();
        for path in tracked {
            let full_path = self.root.join(&path);
            let Ok(current) = algorithm.digest_file(&full_path) else {
                continue;
            };
            let unchanged = match &latest {
                None => false,
                Some(snapshot) => match snapshot.version(&path)? {
                    Some(version) => *version.checksum() == current,
                    None => false,
                },
            };
            if !unchanged {
                modified.insert(path);
            }
        }
        Ok(modified)
    }

    /// Records a new snapshot over `paths` (files and/or directories,
    /// relative to the working directory root; an empty slice means the
    /// whole tree). Ignored paths (including `.versioning/` itself) are
    /// always excluded. Paths that don't currently exist on disk are
    /// dropped silently rather than failing the commit, and paths that
    /// exist but aren't modified are dropped too unless `force` is set.
    /// If nothing is left afterwards, no snapshot is created.
    pub fn commit(&self, paths: &[PathBuf], force: bool) -> Result<Option<Snapshot>> {
        let candidates = self.scan_tracked_files(paths)?;
        let modified = if force { None } else { Some(self.status()?) };

        let mut selected = Vec::new();
        for path in candidates {
            if let Some(modified) = &modified {
                if !modified.contains(&path) {
                    continue;
                }
            }
            selected.push(PathBuf::from(path));
        }

        if selected.is_empty() {
            return Ok(None);
        }

        let snapshot = self.timeline.create_snapshot(&selected, &self.root, None, "", false)?;
        Ok(Some(snapshot))
    }

    /// Writes the recorded content of `path` (as of `revision`, or the
    /// latest version of `path` if `None`) back to disk, restoring mtime
    /// and permissions. If the target already exists and `overwrite` is
    /// false, the path is skipped silently. Returns the paths actually
    /// written.
    pub fn update(&self, paths: &[PathBuf], revision: Option<i64>, overwrite: bool) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for path in paths {
            let key = path_to_key(path);
            let history = self.timeline.list_versions(&key)?;

            let chosen = match revision {
                None => history.into_iter().next(),
                Some(rev) => history.into_iter().find(|(snapshot, _)| snapshot.revision() == rev),
            };
            let Some((_, version)) = chosen else {
                continue;
            };

            let target = self.root.join(path);
            if target.exists() && !overwrite {
                continue;
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).with_context(|| format!("unable to create {parent:?}"))?;
            }

            let content = version.read(0, version.size())?;
            rvn_tools::fs::replace_file(&target, &content, false)
                .with_context(|| format!("unable to write {target:?}"))?;
            rvn_tools::fs::set_mtime_ms(&target, version.last_modified_ms())?;
            if let Some(permissions) = version.permissions() {
                rvn_tools::fs::set_permission_bits(&target, permissions.to_mode_bits())?;
            }

            written.push(path.clone());
        }
        Ok(written)
    }

    /// Runs the bound timeline's attached cleanup policies.
    pub fn clean(&self) -> Result<Vec<rvn_datastore::RemovedVersion>> {
        self.timeline.clean()
    }
}

fn path_to_key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rvn_datastore::DbProvider;

    fn init_workdir(root: &Path) -> WorkDirectory {
        WorkDirectory::init(root, &DbProvider, Config::new()).unwrap()
    }

    #[test]
    fn init_twice_fails_with_already_a_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        init_workdir(dir.path());
        let err = WorkDirectory::init(dir.path(), &DbProvider, Config::new()).unwrap_err();
        assert!(err.downcast_ref::<ReversionError>().is_some());
    }

    #[test]
    fn open_missing_work_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = WorkDirectory::open(dir.path()).unwrap_err();
        match err.downcast_ref::<ReversionError>() {
            Some(ReversionError::NotAWorkDir { .. }) => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn status_reports_new_and_changed_files_only() {
        let dir = tempfile::tempdir().unwrap();
        let work_dir = init_workdir(dir.path());

        std::fs::write(dir.path().join("a.txt"), b"apple").unwrap();
        assert_eq!(
            work_dir.status().unwrap(),
            BTreeSet::from(["a.txt".to_string()])
        );

        let snapshot = work_dir.commit(&[], false).unwrap().unwrap();
        assert_eq!(snapshot.revision(), 1);
        assert!(work_dir.status().unwrap().is_empty());

        std::fs::write(dir.path().join("a.txt"), b"apple-2").unwrap();
        assert_eq!(
            work_dir.status().unwrap(),
            BTreeSet::from(["a.txt".to_string()])
        );
    }

    #[test]
    fn commit_with_nothing_modified_creates_no_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let work_dir = init_workdir(dir.path());
        std::fs::write(dir.path().join("a.txt"), b"apple").unwrap();
        work_dir.commit(&[], false).unwrap().unwrap();

        assert!(work_dir.commit(&[], false).unwrap().is_none());
        assert!(work_dir
            .commit(&[], true)
            .unwrap()
            .is_some(), "force=true should re-snapshot unmodified files");
    }

    #[test]
    fn update_writes_back_historical_content_and_skips_without_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let work_dir = init_workdir(dir.path());

        std::fs::write(dir.path().join("a.txt"), b"v1").unwrap();
        work_dir.commit(&[], false).unwrap();
        std::fs::write(dir.path().join("a.txt"), b"v2").unwrap();
        work_dir.commit(&[], false).unwrap();

        let target = dir.path().join("restored.txt");
        let written = work_dir
            .update(&[PathBuf::from("restored.txt")], None, false)
            .unwrap();
        // "restored.txt" was never committed, so there is no history to restore.
        assert!(written.is_empty());
        assert!(!target.exists());

        let written = work_dir
            .update(&[PathBuf::from("a.txt")], Some(1), true)
            .unwrap();
        assert_eq!(written, vec![PathBuf::from("a.txt")]);
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"v1");

        // without overwrite, an existing target is left alone
        let written = work_dir
            .update(&[PathBuf::from("a.txt")], Some(2), false)
            .unwrap();
        assert!(written.is_empty());
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"v1");
    }

    #[test]
    fn versioning_directory_is_never_committed() {
        let dir = tempfile::tempdir().unwrap();
        let work_dir = init_workdir(dir.path());
        std::fs::write(dir.path().join("a.txt"), b"apple").unwrap();

        let snapshot = work_dir.commit(&[], false).unwrap().unwrap();
        let paths: Vec<String> = snapshot
            .versions()
            .unwrap()
            .iter()
            .map(|v| v.path().to_string())
            .collect();
        assert_eq!(paths, vec!["a.txt".to_string()]);
    }

    #[test]
    fn open_from_descendant_walks_up_to_the_bound_root() {
        let dir = tempfile::tempdir().unwrap();
        init_workdir(dir.path());
        std::fs::create_dir_all(dir.path().join("sub/dir")).unwrap();

        let found = WorkDirectory::open_from_descendant(dir.path().join("sub/dir")).unwrap();
        assert_eq!(found.root(), dir.path());
    }
}
