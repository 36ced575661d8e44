use anyhow::Result;
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct CompanionPaths {
    pub home: PathBuf,
    pub config_file: PathBuf,
    pub character_file: PathBuf,
    pub logs_dir: PathBuf,
}

impl CompanionPaths {
    /// Layout rooted at `home`, ignoring the environment.
    pub fn under(home: &Path) -> Self {
        Self {
            home: home.to_path_buf(),
            config_file: home.join("companion.toml"),
            character_file: home.join("character.toml"),
            logs_dir: home.join("logs"),
        }
    }

    pub fn audit_log(&self) -> PathBuf {
        self.logs_dir.join("audit.log")
    }

    /// Resolve a configured history file; relative names live under home.
    pub fn history_file(&self, configured: &str) -> PathBuf {
        let path = Path::new(configured);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.home.join(path)
        }
    }
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_path(var: &str) -> Option<PathBuf> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(PathBuf::from(v.trim())),
        _ => None,
    }
}

pub fn resolve_paths() -> Result<CompanionPaths> {
    let home = match env_path("COMPANION_HOME") {
        Some(home) => home,
        None => required_home_dir()?.join(".companion"),
    };

    let mut paths = CompanionPaths::under(&home);
    if let Some(config_file) = env_path("COMPANION_CONFIG_PATH") {
        paths.config_file = config_file;
    }
    if let Some(character_file) = env_path("COMPANION_CHARACTER_PATH") {
        paths.character_file = character_file;
    }
    if let Some(logs_dir) = env_path("COMPANION_LOGS_DIR") {
        paths.logs_dir = logs_dir;
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::CompanionPaths;
    use std::path::{Path, PathBuf};

    #[test]
    fn history_file_is_relative_to_home() {
        let paths = CompanionPaths::under(Path::new("/srv/companion"));
        assert_eq!(
            paths.history_file("conversation_history.json"),
            PathBuf::from("/srv/companion/conversation_history.json")
        );
        assert_eq!(
            paths.history_file("/var/lib/h.json"),
            PathBuf::from("/var/lib/h.json")
        );
    }
}
