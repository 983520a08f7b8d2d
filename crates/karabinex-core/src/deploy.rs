// Karabinex Deploy
// Validate, write, back up, restore and reload karabiner.json

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::Value;

use crate::Document;

/// Number of automatic backups kept next to the config
pub const MAX_BACKUPS: usize = 10;

/// Backup directory, relative to the config's parent
pub const BACKUP_DIR: &str = "automatic_backups";

const BACKUP_PREFIX: &str = "karabiner_backup_";
const BACKUP_TIMESTAMP: &str = "%Y%m%d_%H%M%S";
const KARABINER_SERVER: &str = "org.pqrs.karabiner.karabiner_console_user_server";

/// Errors that can occur while persisting a configuration
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("Invalid configuration: {}", .0.join(", "))]
    Validation(Vec<String>),

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Backup not found: {}", .0.display())]
    BackupNotFound(PathBuf),

    #[error("Could not determine the home directory")]
    NoHomeDir,
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> DeployError + '_ {
    move |source| DeployError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// `~/.config/karabiner/karabiner.json`
pub fn default_config_path() -> Result<PathBuf, DeployError> {
    dirs::home_dir()
        .map(|home| home.join(".config").join("karabiner").join("karabiner.json"))
        .ok_or(DeployError::NoHomeDir)
}

/// Shape checks the daemon relies on; an empty list means valid
pub fn validate_config(document: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    if document.get("global").is_none() {
        errors.push("Missing 'global' key".to_string());
    }
    match document.get("profiles") {
        None => errors.push("Missing 'profiles' key".to_string()),
        Some(Value::Array(profiles)) if profiles.is_empty() => {
            errors.push("At least one profile is required".to_string())
        }
        Some(Value::Array(_)) => {}
        Some(_) => errors.push("'profiles' must be a list".to_string()),
    }
    errors
}

/// How a document is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOptions {
    pub path: PathBuf,
    pub backup: bool,
    pub dry_run: bool,
    pub reload: bool,
}

impl SaveOptions {
    /// Write to `path` with backups on, no reload
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            backup: true,
            dry_run: false,
            reload: false,
        }
    }

    pub fn backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn reload(mut self, reload: bool) -> Self {
        self.reload = reload;
        self
    }
}

/// What `save_config` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub path: PathBuf,
    pub dry_run: bool,
    /// The new text differs from the file on disk (or there was no file)
    pub changed: bool,
    pub backup: Option<PathBuf>,
    /// `None` when no reload was requested
    pub reloaded: Option<bool>,
    /// Dry run only: a line diff, or the whole document for a new file
    pub preview: Option<String>,
}

/// Compile, validate and write a document
pub fn save_config(document: &Document, options: &SaveOptions) -> Result<SaveOutcome, DeployError> {
    save_value(&document.compile(), options)
}

/// Validate and write an already compiled document
pub fn save_value(document: &Value, options: &SaveOptions) -> Result<SaveOutcome, DeployError> {
    let errors = validate_config(document);
    if !errors.is_empty() {
        return Err(DeployError::Validation(errors));
    }

    let path = options.path.as_path();
    let rendered = serde_json::to_string_pretty(document)?;

    let existing = if path.exists() {
        Some(fs::read_to_string(path).map_err(io_err(path))?)
    } else {
        None
    };
    let changed = existing.as_deref() != Some(rendered.as_str());

    let mut outcome = SaveOutcome {
        path: path.to_path_buf(),
        dry_run: options.dry_run,
        changed,
        backup: None,
        reloaded: None,
        preview: None,
    };

    if options.dry_run {
        let label = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        outcome.preview = Some(match &existing {
            Some(old) => line_diff(old, &rendered, &label),
            None => rendered,
        });
        return Ok(outcome);
    }

    if options.backup && existing.is_some() {
        outcome.backup = backup_config(path)?;
    }

    write_atomic(path, &rendered)?;
    log::info!("Karabiner config written to {}", path.display());

    if options.reload {
        outcome.reloaded = Some(reload_karabiner());
    }

    Ok(outcome)
}

fn write_atomic(path: &Path, content: &str) -> Result<(), DeployError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    let temp = path.with_extension("json.tmp");
    fs::write(&temp, content).map_err(io_err(&temp))?;
    fs::rename(&temp, path).map_err(io_err(path))?;
    Ok(())
}

fn backup_dir_for(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(BACKUP_DIR)
}

fn is_backup_file(path: &Path) -> bool {
    path.is_file()
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(BACKUP_PREFIX) && n.ends_with(".json"))
}

/// Copy the config into the backup directory; `None` if there is nothing to back up
pub fn backup_config(config_path: &Path) -> Result<Option<PathBuf>, DeployError> {
    if !config_path.exists() {
        return Ok(None);
    }

    let backup_dir = backup_dir_for(config_path);
    fs::create_dir_all(&backup_dir).map_err(io_err(&backup_dir))?;
    migrate_legacy_backups(config_path, &backup_dir)?;

    let timestamp = chrono::Local::now().format(BACKUP_TIMESTAMP);
    let backup = backup_dir.join(format!("{}{}.json", BACKUP_PREFIX, timestamp));
    fs::copy(config_path, &backup).map_err(io_err(&backup))?;
    log::info!("Backed up {} to {}", config_path.display(), backup.display());

    cleanup_backups(&backup_dir, MAX_BACKUPS)?;
    Ok(Some(backup))
}

/// Move backups left directly in the config directory into `backup_dir`
pub fn migrate_legacy_backups(config_path: &Path, backup_dir: &Path) -> Result<(), DeployError> {
    let Some(config_dir) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };

    for entry in fs::read_dir(config_dir).map_err(io_err(config_dir))? {
        let legacy = entry.map_err(io_err(config_dir))?.path();
        if !is_backup_file(&legacy) {
            continue;
        }
        let Some(name) = legacy.file_name() else {
            continue;
        };
        let target = backup_dir.join(name);
        if target.exists() {
            fs::remove_file(&legacy).map_err(io_err(&legacy))?;
        } else {
            fs::rename(&legacy, &target).map_err(io_err(&legacy))?;
            log::debug!("Migrated legacy backup {}", legacy.display());
        }
    }
    Ok(())
}

fn sorted_backups(backup_dir: &Path) -> Result<Vec<PathBuf>, DeployError> {
    if !backup_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut backups = Vec::new();
    for entry in fs::read_dir(backup_dir).map_err(io_err(backup_dir))? {
        let path = entry.map_err(io_err(backup_dir))?.path();
        if is_backup_file(&path) {
            let modified = fs::metadata(&path).and_then(|m| m.modified()).ok();
            backups.push((modified, path));
        }
    }
    // Newest first; names embed the timestamp and break mtime ties
    backups.sort_by(|a, b| b.cmp(a));
    Ok(backups.into_iter().map(|(_, path)| path).collect())
}

/// Delete all but the `keep` newest backups, returning what was removed
pub fn cleanup_backups(backup_dir: &Path, keep: usize) -> Result<Vec<PathBuf>, DeployError> {
    let stale: Vec<PathBuf> = sorted_backups(backup_dir)?.into_iter().skip(keep).collect();
    for path in &stale {
        fs::remove_file(path).map_err(io_err(path))?;
    }
    Ok(stale)
}

/// Backups for `config_path`, newest first
pub fn list_backups(config_path: &Path) -> Result<Vec<PathBuf>, DeployError> {
    sorted_backups(&backup_dir_for(config_path))
}

/// Copy a backup over the config file
pub fn restore_config(backup: &Path, target: &Path) -> Result<(), DeployError> {
    if !backup.is_file() {
        return Err(DeployError::BackupNotFound(backup.to_path_buf()));
    }
    fs::copy(backup, target).map_err(io_err(target))?;
    log::info!("Restored {} from {}", target.display(), backup.display());
    Ok(())
}

/// Restart the Karabiner console user server through launchd
pub fn reload_karabiner() -> bool {
    // SAFETY: getuid has no preconditions and cannot fail
    let uid = unsafe { libc::getuid() };
    let target = format!("gui/{}/{}", uid, KARABINER_SERVER);

    match Command::new("launchctl").args(["kickstart", "-k", &target]).output() {
        Ok(output) if output.status.success() => true,
        Ok(output) => {
            log::warn!(
                "launchctl kickstart failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            false
        }
        Err(e) => {
            log::warn!("Could not run launchctl: {}", e);
            false
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Keep,
    Remove,
    Add,
}

const DIFF_CONTEXT: usize = 3;

/// Unified-style line diff; empty when the texts are identical
pub fn line_diff(old: &str, new: &str, label: &str) -> String {
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();
    let ops = diff_ops(&old_lines, &new_lines);
    if ops.iter().all(|(op, _)| *op == Op::Keep) {
        return String::new();
    }

    // 1-based line numbers at the start of each op
    let mut positions = Vec::with_capacity(ops.len());
    let (mut old_no, mut new_no) = (1usize, 1usize);
    for (op, _) in &ops {
        positions.push((old_no, new_no));
        match op {
            Op::Keep => {
                old_no += 1;
                new_no += 1;
            }
            Op::Remove => old_no += 1,
            Op::Add => new_no += 1,
        }
    }

    let mut hunks: Vec<(usize, usize)> = Vec::new();
    for (idx, (op, _)) in ops.iter().enumerate() {
        if *op == Op::Keep {
            continue;
        }
        let start = idx.saturating_sub(DIFF_CONTEXT);
        let end = (idx + DIFF_CONTEXT + 1).min(ops.len());
        match hunks.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => hunks.push((start, end)),
        }
    }

    let mut out = format!("--- a/{}\n+++ b/{}\n", label, label);
    for (start, end) in hunks {
        let slice = &ops[start..end];
        let old_count = slice.iter().filter(|(op, _)| *op != Op::Add).count();
        let new_count = slice.iter().filter(|(op, _)| *op != Op::Remove).count();
        let (old_start, new_start) = positions[start];
        let _ = writeln!(
            out,
            "@@ -{},{} +{},{} @@",
            if old_count == 0 { old_start - 1 } else { old_start },
            old_count,
            if new_count == 0 { new_start - 1 } else { new_start },
            new_count
        );
        for (op, line) in slice {
            let marker = match op {
                Op::Keep => ' ',
                Op::Remove => '-',
                Op::Add => '+',
            };
            let _ = writeln!(out, "{}{}", marker, line);
        }
    }
    out
}

/// Largest LCS table (in cells) before the changed region is shown as a
/// whole replacement
const MAX_DIFF_CELLS: usize = 4_000_000;

/// Line ops over the common prefix, the changed middle and the common suffix
fn diff_ops<'a>(old: &[&'a str], new: &[&'a str]) -> Vec<(Op, &'a str)> {
    let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let a = &old[prefix..old.len() - suffix];
    let b = &new[prefix..new.len() - suffix];

    let mut ops: Vec<(Op, &str)> = old[..prefix].iter().map(|l| (Op::Keep, *l)).collect();
    if a.len().saturating_mul(b.len()) > MAX_DIFF_CELLS {
        log::debug!(
            "Diff region {}x{} lines too large, showing a full replacement",
            a.len(),
            b.len()
        );
        ops.extend(a.iter().map(|l| (Op::Remove, *l)));
        ops.extend(b.iter().map(|l| (Op::Add, *l)));
    } else {
        lcs_ops(a, b, &mut ops);
    }
    ops.extend(old[old.len() - suffix..].iter().map(|l| (Op::Keep, *l)));
    ops
}

fn lcs_ops<'a>(a: &[&'a str], b: &[&'a str], ops: &mut Vec<(Op, &'a str)>) {
    let width = b.len() + 1;
    let mut lcs = vec![0u32; (a.len() + 1) * width];
    for i in (0..a.len()).rev() {
        for j in (0..b.len()).rev() {
            lcs[i * width + j] = if a[i] == b[j] {
                lcs[(i + 1) * width + j + 1] + 1
            } else {
                lcs[(i + 1) * width + j].max(lcs[i * width + j + 1])
            };
        }
    }

    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i] == b[j] {
            ops.push((Op::Keep, a[i]));
            i += 1;
            j += 1;
        } else if lcs[(i + 1) * width + j] >= lcs[i * width + j + 1] {
            ops.push((Op::Remove, a[i]));
            i += 1;
        } else {
            ops.push((Op::Add, b[j]));
            j += 1;
        }
    }
    ops.extend(a[i..].iter().map(|l| (Op::Remove, *l)));
    ops.extend(b[j..].iter().map(|l| (Op::Add, *l)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Profile;
    use serde_json::json;

    fn doc() -> Document {
        Document::new().add_profile(Profile::new("Default"))
    }

    #[test]
    fn test_validate_config() {
        assert!(validate_config(&doc().compile()).is_empty());
        assert_eq!(
            validate_config(&json!({})),
            vec!["Missing 'global' key", "Missing 'profiles' key"]
        );
        assert_eq!(
            validate_config(&json!({"global": {}, "profiles": []})),
            vec!["At least one profile is required"]
        );
        assert_eq!(
            validate_config(&json!({"global": {}, "profiles": {}})),
            vec!["'profiles' must be a list"]
        );
    }

    #[test]
    fn test_save_rejects_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let err = save_config(&Document::new(), &SaveOptions::new(dir.path().join("k.json")))
            .unwrap_err();
        assert!(matches!(err, DeployError::Validation(_)));
        assert!(err.to_string().contains("At least one profile is required"));
    }

    #[test]
    fn test_save_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("karabiner").join("karabiner.json");
        let outcome = save_config(&doc(), &SaveOptions::new(&path)).unwrap();

        assert!(outcome.changed);
        assert!(outcome.backup.is_none());
        assert_eq!(outcome.reloaded, None);
        let written: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, doc().compile());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_dry_run_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("karabiner.json");

        let outcome = save_config(&doc(), &SaveOptions::new(&path).dry_run(true)).unwrap();
        assert!(outcome.dry_run);
        assert!(!path.exists());
        assert!(outcome.preview.unwrap().contains("\"profiles\""));

        fs::write(&path, "{}").unwrap();
        let outcome = save_config(&doc(), &SaveOptions::new(&path).dry_run(true)).unwrap();
        let preview = outcome.preview.unwrap();
        assert!(preview.starts_with("--- a/karabiner.json\n+++ b/karabiner.json\n"));
        assert!(preview.contains("\n-{}\n"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn test_save_backs_up_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("karabiner.json");
        fs::write(&path, "{\"old\": true}").unwrap();

        let outcome = save_config(&doc(), &SaveOptions::new(&path)).unwrap();
        let backup = outcome.backup.unwrap();
        assert!(backup.starts_with(dir.path().join(BACKUP_DIR)));
        assert_eq!(fs::read_to_string(&backup).unwrap(), "{\"old\": true}");
        assert_eq!(list_backups(&path).unwrap(), vec![backup]);

        let again = save_config(&doc(), &SaveOptions::new(&path).backup(false)).unwrap();
        assert!(!again.changed);
        assert!(again.backup.is_none());
    }

    #[test]
    fn test_cleanup_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..12 {
            let name = format!("karabiner_backup_20240101_0000{:02}.json", i);
            fs::write(dir.path().join(name), "{}").unwrap();
        }
        fs::write(dir.path().join("unrelated.json"), "{}").unwrap();

        let removed = cleanup_backups(dir.path(), MAX_BACKUPS).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(sorted_backups(dir.path()).unwrap().len(), MAX_BACKUPS);
        assert!(dir.path().join("unrelated.json").exists());
    }

    #[test]
    fn test_migrate_legacy_backups() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("karabiner.json");
        fs::write(&config, "{}").unwrap();
        fs::write(dir.path().join("karabiner_backup_20230101_000000.json"), "legacy").unwrap();

        let backup = backup_config(&config).unwrap().unwrap();
        let backup_dir = dir.path().join(BACKUP_DIR);
        assert!(backup_dir.join("karabiner_backup_20230101_000000.json").exists());
        assert!(!dir.path().join("karabiner_backup_20230101_000000.json").exists());
        assert!(backup.exists());
        assert_eq!(list_backups(&config).unwrap().len(), 2);
    }

    #[test]
    fn test_backup_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        assert!(backup_config(&dir.path().join("missing.json")).unwrap().is_none());
        assert!(list_backups(&dir.path().join("missing.json")).unwrap().is_empty());
    }

    #[test]
    fn test_restore_config() {
        let dir = tempfile::tempdir().unwrap();
        let backup = dir.path().join("backup.json");
        let target = dir.path().join("karabiner.json");
        fs::write(&backup, "{\"restored\": 1}").unwrap();

        restore_config(&backup, &target).unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "{\"restored\": 1}");

        let err = restore_config(&dir.path().join("nope.json"), &target).unwrap_err();
        assert!(matches!(err, DeployError::BackupNotFound(_)));
    }

    #[test]
    fn test_line_diff() {
        assert_eq!(line_diff("a\nb\n", "a\nb\n", "x.json"), "");

        let diff = line_diff("a\nb\nc\n", "a\nB\nc\n", "x.json");
        assert_eq!(
            diff,
            "--- a/x.json\n+++ b/x.json\n@@ -1,3 +1,3 @@\n a\n-b\n+B\n c\n"
        );
    }

    #[test]
    fn test_line_diff_separate_hunks() {
        let old: String = (1..=20).map(|i| format!("{}\n", i)).collect();
        let new: String = (1..=20)
            .map(|i| match i {
                2 => "two\n".to_string(),
                19 => "nineteen\n".to_string(),
                _ => format!("{}\n", i),
            })
            .collect();
        let diff = line_diff(&old, &new, "n");
        assert_eq!(diff.matches("@@ -").count(), 2);
        assert!(diff.contains("-19\n+nineteen\n"));
        assert!(diff.contains("@@ -1,5 +1,5 @@"));
    }

    #[test]
    fn test_line_diff_pure_insertion() {
        let diff = line_diff("", "x\n", "f");
        assert!(diff.contains("@@ -0,0 +1,1 @@\n+x\n"));
    }

    #[test]
    fn test_line_diff_reindented_large_file() {
        // Same document with 2-space and 4-space indentation
        let old: String = (0..12_000).map(|i| format!("  \"k{}\": {},\n", i, i)).collect();
        let new: String = (0..12_000).map(|i| format!("    \"k{}\": {},\n", i, i)).collect();
        let diff = line_diff(&old, &new, "karabiner.json");

        assert_eq!(diff.matches("@@ -").count(), 1);
        assert!(diff.contains("@@ -1,12000 +1,12000 @@\n"));
        assert_eq!(diff.lines().filter(|l| l.starts_with("-  ")).count(), 12_000);
        assert_eq!(diff.lines().filter(|l| l.starts_with("+    ")).count(), 12_000);
    }

    #[test]
    fn test_line_diff_keeps_common_edges_when_capped() {
        let head = "{\n  \"global\": {},\n";
        let old: String = (0..3_000).map(|i| format!("a{}\n", i)).collect();
        let new: String = (0..3_000).map(|i| format!("b{}\n", i)).collect();
        let diff = line_diff(&format!("{}{}}}\n", head, old), &format!("{}{}}}\n", head, new), "k");

        assert!(diff.contains("@@ -1,3003 +1,3003 @@\n {\n  \"global\": {},\n-a0\n"));
        assert!(diff.ends_with("+b2999\n }\n"));
    }
}
