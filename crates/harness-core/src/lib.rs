use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Creates `path` and any missing parents. Existing directories are fine.
pub fn ensure_dir(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)
}

pub fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent),
        _ => Ok(()),
    }
}

/// Hidden sibling of `path` used while its content is still being produced,
/// e.g. `.CRANBERRY.h5.tmp.4121.1697040000123456`.
pub fn temp_sibling(path: &Path, tag: &str) -> PathBuf {
    let ts = Utc::now().timestamp_micros();
    let pid = std::process::id();
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("tmpfile");
    path.with_file_name(format!(".{}.{}.{}.{}", name, tag, pid, ts))
}

/// Produces `path` through a temporary sibling that `produce` fills in.
///
/// The temporary is renamed over `path` only when `produce` succeeds; on any
/// failure it is removed and `path` is left untouched.
pub fn publish_atomically<E, F>(path: &Path, tag: &str, produce: F) -> Result<(), E>
where
    E: From<io::Error>,
    F: FnOnce(&Path) -> Result<(), E>,
{
    ensure_parent_dir(path)?;
    let tmp = temp_sibling(path, tag);
    let outcome = produce(&tmp).and_then(|()| {
        fs::File::open(&tmp)?.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    });
    if outcome.is_err() {
        let _ = fs::remove_file(&tmp);
        return outcome;
    }
    if let Some(parent) = path.parent() {
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> io::Result<()> {
    publish_atomically(path, "tmp", |tmp| {
        let mut file = fs::File::create(tmp)?;
        file.write_all(bytes)?;
        Ok(())
    })
}

pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
