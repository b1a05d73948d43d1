//! Save-directory backups and log housekeeping

use std::fmt::Write as _;
use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::config::BackupSettings;

const DEFAULT_FORMAT: &str = "Server_Backup_%Y-%m-%d_%H-%M-%S";
const ARCHIVE_EXT: &str = "tar.gz";
/// Directory names never copied into a backup
const EXCLUDED_DIRS: &[&str] = &["Logs", "Crashes"];

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("Save directory not found: {}", .0.display())]
    MissingSource(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

/// Archive the save directory and apply retention, returning the archive path
pub fn create_backup(
    settings: &BackupSettings,
    install_dir: &Path,
    now: DateTime<Local>,
) -> Result<PathBuf, BackupError> {
    let source = install_dir.join(&settings.save_dir);
    if !source.is_dir() {
        return Err(BackupError::MissingSource(source));
    }

    let backup_dir = install_dir.join(&settings.backup_dir);
    std::fs::create_dir_all(&backup_dir)?;

    let name = archive_name(&settings.format, now);
    let target = backup_dir.join(format!("{}.{}", name, ARCHIVE_EXT));
    let partial = backup_dir.join(format!("{}.{}.partial", name, ARCHIVE_EXT));

    let result = write_archive(&source, &partial);
    if let Err(e) = result {
        let _ = std::fs::remove_file(&partial);
        return Err(e);
    }
    std::fs::rename(&partial, &target)?;
    log::info!("Backup written to {}", target.display());

    let removed = prune_backups(&backup_dir, settings.retention)?;
    if removed > 0 {
        log::info!("Removed {} old backup(s)", removed);
    }

    Ok(target)
}

/// Expand the strftime pattern; an unusable pattern falls back to the default
pub fn archive_name(format: &str, now: DateTime<Local>) -> String {
    let mut name = String::new();
    let expanded = !format.is_empty() && write!(name, "{}", now.format(format)).is_ok();
    if !expanded {
        if !format.is_empty() {
            log::warn!("Invalid backup name format '{}', using default", format);
        }
        name.clear();
        let _ = write!(name, "{}", now.format(DEFAULT_FORMAT));
    }
    name.replace(['/', '\\'], "_")
}

fn write_archive(source: &Path, target: &Path) -> Result<(), BackupError> {
    let file = File::create(target)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    append_dir(&mut builder, source, Path::new("Saved"))?;

    builder.into_inner()?.finish()?;
    Ok(())
}

fn append_dir<W: std::io::Write>(
    builder: &mut tar::Builder<W>,
    dir: &Path,
    prefix: &Path,
) -> Result<(), BackupError> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?.filter_map(Result::ok).collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let name = entry.file_name();
        let archived = prefix.join(&name);
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            if EXCLUDED_DIRS.iter().any(|d| name == *d) {
                continue;
            }
            append_dir(builder, &path, &archived)?;
        } else if file_type.is_file() {
            if path.extension().is_some_and(|ext| ext == "log") {
                continue;
            }
            builder.append_path_with_name(&path, &archived)?;
        }
    }
    Ok(())
}

/// Delete the oldest archives beyond `retention` (0 = keep all)
pub fn prune_backups(dir: &Path, retention: usize) -> Result<usize, BackupError> {
    if retention == 0 {
        return Ok(0);
    }
    let pattern = dir.join(format!("*.{}", ARCHIVE_EXT));
    prune_oldest(&pattern.to_string_lossy(), retention)
}

/// Keep only the newest `keep` `*.log` files in `dir`
pub fn rotate_logs(dir: &Path, keep: usize) -> Result<usize, BackupError> {
    let pattern = dir.join("*.log");
    prune_oldest(&pattern.to_string_lossy(), keep)
}

fn prune_oldest(pattern: &str, keep: usize) -> Result<usize, BackupError> {
    let mut files: Vec<(std::time::SystemTime, PathBuf)> = glob::glob(pattern)?
        .filter_map(Result::ok)
        .filter_map(|p| {
            let modified = p.metadata().and_then(|m| m.modified()).ok()?;
            Some((modified, p))
        })
        .collect();

    if files.len() <= keep {
        return Ok(0);
    }

    files.sort();
    let excess = files.len() - keep;
    let mut removed = 0;
    for (_, path) in files.into_iter().take(excess) {
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => log::warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
    Ok(removed)
}
