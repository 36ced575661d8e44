use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Exclusive advisory lock held next to a persisted transcript. Released on drop.
#[derive(Debug)]
pub struct SessionLock {
    file: File,
}

pub fn lock_path_for(history_file: &Path) -> PathBuf {
    let mut name = history_file
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "history".into());
    name.push(".lock");
    history_file.with_file_name(name)
}

impl SessionLock {
    pub fn acquire(history_file: &Path) -> Result<Self> {
        let path = lock_path_for(history_file);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        file.try_lock_exclusive().with_context(|| {
            format!(
                "transcript {} is in use by another companion process",
                history_file.display()
            )
        })?;
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        Ok(Self { file })
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_acquire_fails_until_release() {
        let tmp = tempdir().expect("tempdir");
        let history = tmp.path().join("conversation_history.json");

        let first = SessionLock::acquire(&history).expect("first lock");
        assert!(tmp.path().join("conversation_history.json.lock").is_file());
        assert!(SessionLock::acquire(&history).is_err());
        drop(first);
        assert!(SessionLock::acquire(&history).is_ok());
    }
}
