//! Reads and writes the `{N}.json` migration files in a migrations
//! directory.

use std::fs;
use std::path::{Path, PathBuf};

use crate::diff::Migration;
use crate::error::{MigrateError, Result};

fn parse_version(path: &Path) -> Option<usize> {
    path.file_stem()?.to_str()?.parse().ok()
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

/// Lists migration files in `dir`, sorted by version ascending. Rejects any
/// non-hidden `.json` file whose stem isn't a plain positive integer, and
/// any sequence with a gap — both are `MigrationSkew` per spec, since either
/// means the directory isn't something this engine wrote.
pub fn list_versions(dir: &Path) -> Result<Vec<usize>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut versions = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if is_hidden(&path) {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            return Err(MigrateError::InvalidFilename(path.display().to_string()));
        }
        match parse_version(&path) {
            Some(v) => versions.push(v),
            None => return Err(MigrateError::InvalidFilename(path.display().to_string())),
        }
    }
    versions.sort_unstable();
    for pair in versions.windows(2) {
        if pair[1] != pair[0] + 1 {
            return Err(MigrateError::Skew(format!(
                "migration sequence has a gap between {} and {}",
                pair[0], pair[1]
            )));
        }
    }
    if let Some(&first) = versions.first() {
        if first != 1 {
            return Err(MigrateError::Skew(format!("migration sequence does not start at 1, found {first}")));
        }
    }
    Ok(versions)
}

/// The next version number to write: one past the highest existing, or `1`
/// for an empty directory.
pub fn next_version(dir: &Path) -> Result<usize> {
    Ok(list_versions(dir)?.into_iter().max().map(|v| v + 1).unwrap_or(1))
}

/// Writes `migration` to `{dir}/{migration.version}.json`, via a temp file
/// plus rename so a crash mid-write never leaves a partially-written
/// migration visible under its real name.
pub fn write_migration(dir: &Path, migration: &Migration) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let final_path = dir.join(format!("{}.json", migration.version));
    let tmp_path = dir.join(format!(".{}.json.tmp", migration.version));

    let body = serde_json::to_string_pretty(migration)?;
    fs::write(&tmp_path, body)?;
    fs::rename(&tmp_path, &final_path)?;
    Ok(final_path)
}

pub fn read_migration(dir: &Path, version: usize) -> Result<Migration> {
    let path = dir.join(format!("{version}.json"));
    let body = fs::read_to_string(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            MigrateError::InvalidFilename(path.display().to_string())
        } else {
            MigrateError::Io(e)
        }
    })?;
    let mut migration: Migration = serde_json::from_str(&body)?;
    migration.version = version;
    Ok(migration)
}

/// Loads every migration strictly newer than `from_version`, in order.
pub fn load_chain(dir: &Path, from_version: usize) -> Result<Vec<Migration>> {
    list_versions(dir)?
        .into_iter()
        .filter(|v| *v > from_version)
        .map(|v| read_migration(dir, v))
        .collect()
}
