use std::fs::{self, File};
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use anyhow::{format_err, Error};
use nix::sys::stat::{utimensat, UtimensatFlags};
use nix::sys::time::TimeSpec;

/// Write `data` to `target` atomically: write to `<target>.tmp`, `fsync`
/// it, then rename into place. Mirrors `proxmox_sys::fs::replace_file`,
/// which every write in `pbs-datastore::chunk_store.rs` goes through.
pub fn replace_file(target: impl AsRef<Path>, data: &[u8], fsync: bool) -> Result<(), Error> {
    let target = target.as_ref();
    let tmp_path = tmp_path_for(target);

    let write_result = (|| -> Result<(), Error> {
        let mut file = File::create(&tmp_path)
            .map_err(|err| format_err!("unable to create temp file {tmp_path:?} - {err}"))?;
        file.write_all(data)
            .map_err(|err| format_err!("unable to write temp file {tmp_path:?} - {err}"))?;
        if fsync {
            file.sync_all()
                .map_err(|err| format_err!("fsync of {tmp_path:?} failed - {err}"))?;
        }
        Ok(())
    })();

    if let Err(err) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }

    fs::rename(&tmp_path, target)
        .map_err(|err| format_err!("unable to rename {tmp_path:?} to {target:?} - {err}"))?;

    if fsync {
        if let Some(dir) = target.parent() {
            fsync_dir(dir)?;
        }
    }

    Ok(())
}

fn tmp_path_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    target.with_file_name(name)
}

/// `fsync` a directory handle, to persist a rename into it.
pub fn fsync_dir(dir: impl AsRef<Path>) -> Result<(), Error> {
    let handle = File::open(dir.as_ref())
        .map_err(|err| format_err!("unable to open dir {:?} - {err}", dir.as_ref()))?;
    nix::unistd::fsync(handle.as_raw_fd())
        .map_err(|err| format_err!("fsync of directory {:?} failed - {err}", dir.as_ref()))
}

/// Recursively create `path` with the given octal permission mode,
/// tolerating an already-existing directory (returns `Ok(true)` if it was
/// created, `Ok(false)` if it already existed).
pub fn create_path(path: impl AsRef<Path>, mode: u32) -> Result<bool, Error> {
    let path = path.as_ref();
    if path.is_dir() {
        return Ok(false);
    }
    fs::create_dir_all(path)
        .map_err(|err| format_err!("unable to create directory {path:?} - {err}"))?;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|err| format_err!("unable to chmod directory {path:?} - {err}"))?;
    Ok(true)
}

/// Read a file's contents as a string, returning `None` if it does not
/// exist rather than erroring — matches
/// `proxmox_sys::fs::file_read_optional_string`, used throughout
/// `pbs-config` for optional config files.
pub fn read_optional_string(path: impl AsRef<Path>) -> Result<Option<String>, Error> {
    match fs::read_to_string(path.as_ref()) {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(format_err!(
            "unable to read {:?} - {err}",
            path.as_ref()
        )),
    }
}

/// Restore a file's modification time from milliseconds since the Unix
/// epoch, leaving its access time untouched. Mirrors
/// `pbs-client::pxar::metadata`'s use of `utimensat` with `UTIME_OMIT` for
/// the access time, swapped from restoring a whole `pxar` metadata record
/// to just the one field `update` needs.
pub fn set_mtime_ms(path: impl AsRef<Path>, mtime_ms: i64) -> Result<(), Error> {
    let path = path.as_ref();
    let mtime = TimeSpec::new(mtime_ms.div_euclid(1000), mtime_ms.rem_euclid(1000) * 1_000_000);
    let atime_omit = TimeSpec::new(0, libc::UTIME_OMIT as i64);

    utimensat(None, path, &atime_omit, &mtime, UtimensatFlags::FollowSymlink)
        .map_err(|err| format_err!("utimensat failed for {path:?} - {err}"))
}

/// Set a file's permission bits from the low 9 mode bits of `mode`.
pub fn set_permission_bits(path: impl AsRef<Path>, mode: u32) -> Result<(), Error> {
    fs::set_permissions(path.as_ref(), fs::Permissions::from_mode(mode))
        .map_err(|err| format_err!("unable to chmod {:?} - {err}", path.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_file_is_atomic_and_visible() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("data.bin");

        replace_file(&target, b"hello", false).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"hello");

        // overwriting replaces content and leaves no .tmp file behind
        replace_file(&target, b"world", false).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"world");
        assert!(!tmp_path_for(&target).exists());
    }

    #[test]
    fn create_path_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("a/b/c");

        assert!(create_path(&sub, 0o755).unwrap());
        assert!(!create_path(&sub, 0o755).unwrap());
        assert!(sub.is_dir());
    }

    #[test]
    fn read_optional_string_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.txt");
        assert!(read_optional_string(&missing).unwrap().is_none());
    }

    #[test]
    fn set_mtime_ms_round_trips_to_second_precision() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("f");
        fs::write(&target, b"x").unwrap();

        // 2021-01-01T00:00:00Z
        let mtime_ms: i64 = 1_609_459_200_000;
        set_mtime_ms(&target, mtime_ms).unwrap();

        let actual = fs::metadata(&target).unwrap().modified().unwrap();
        let actual_ms = actual
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis() as i64;
        assert_eq!(actual_ms, mtime_ms);
    }

    #[test]
    fn set_permission_bits_applies_mode() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("f");
        fs::write(&target, b"x").unwrap();

        set_permission_bits(&target, 0o640).unwrap();
        let mode = fs::metadata(&target).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }
}
