use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

const ENV_PREFIX: &str = "COMPANION_";

fn rust_sources(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(next) = pending.pop() {
        for entry in fs::read_dir(&next)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "rs") {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

/// Whole-word `COMPANION_*` identifiers in `source`.
fn env_keys_in(source: &str) -> impl Iterator<Item = &str> {
    source
        .split(|c: char| !(c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'))
        .filter(|word| word.len() > ENV_PREFIX.len() && word.starts_with(ENV_PREFIX))
}

fn write_allowlist(out_dir: &Path) -> std::io::Result<()> {
    let mut keys = BTreeSet::new();
    for file in rust_sources(Path::new("src"))? {
        let source = fs::read_to_string(&file)?;
        keys.extend(env_keys_in(&source).map(str::to_owned));
    }

    let mut out = fs::File::create(out_dir.join("companion_env_allowlist.rs"))?;
    writeln!(out, "pub const GENERATED_COMPANION_ENV_ALLOWLIST: &[&str] = &[")?;
    for key in &keys {
        writeln!(out, "    {key:?},")?;
    }
    writeln!(out, "];")
}

fn main() {
    let out_dir = PathBuf::from(env::var_os("OUT_DIR").expect("cargo sets OUT_DIR"));
    write_allowlist(&out_dir).expect("write COMPANION env allowlist");

    let since_epoch = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    println!(
        "cargo:rustc-env=BUILD_UUID={:x}-{:x}",
        since_epoch.as_secs(),
        since_epoch.subsec_nanos()
    );
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src");
}
