//! Directory scanning.
//!
//! A [`FileLister`] produces the base names of candidate files for one
//! harvest cycle. Two listers ship with the crate:
//!
//! | Lister | Candidates |
//! |--------|------------|
//! | [`LsofLister`] | regular files under the directory currently open in some process |
//! | [`DirectoryLister`] | every regular file directly inside the directory |
//!
//! Only the base name survives a scan, so same-named files in different
//! directories share one offset record.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use walkdir::WalkDir;

use crate::config::{ClientConfig, ScanMode};

#[async_trait]
pub trait FileLister: Send + Sync {
    /// Returns candidate base names in discovery order, without duplicates.
    ///
    /// An error means the listing mechanism itself failed; the caller skips
    /// the cycle.
    async fn list(&self) -> Result<Vec<String>>;
}

/// Builds the lister selected by `client.scan_mode`.
pub fn lister_for(config: &ClientConfig) -> Box<dyn FileLister> {
    match config.scan_mode {
        ScanMode::Lsof => Box::new(LsofLister::new(&config.watch_dir)),
        ScanMode::Directory => Box::new(DirectoryLister::new(&config.watch_dir)),
    }
}

/// Lists files held open under a directory by running `lsof +d <dir>`.
pub struct LsofLister {
    dir: PathBuf,
}

impl LsofLister {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl FileLister for LsofLister {
    async fn list(&self) -> Result<Vec<String>> {
        let output = Command::new("lsof")
            .arg("+d")
            .arg(&self.dir)
            .output()
            .await
            .context("Failed to run lsof")?;

        interpret_lsof(
            &self.dir,
            output.status.success(),
            output.status.code(),
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
        )
    }
}

/// Turns an `lsof` run into a listing.
///
/// Rows on stdout are parsed whatever the exit status. With no rows, exit 1
/// and a silent stderr mean nothing is open; anything else is a failure.
pub fn interpret_lsof(
    dir: &Path,
    success: bool,
    code: Option<i32>,
    stdout: &str,
    stderr: &str,
) -> Result<Vec<String>> {
    if success || !stdout.trim().is_empty() {
        return Ok(parse_lsof_output(stdout));
    }
    if code == Some(1) && stderr.trim().is_empty() {
        return Ok(Vec::new());
    }
    match code {
        Some(code) => bail!("lsof +d {} exited {}: {}", dir.display(), code, stderr.trim()),
        None => bail!("lsof +d {} killed by signal: {}", dir.display(), stderr.trim()),
    }
}

/// Extracts base names of `REG` rows from `lsof` table output.
pub fn parse_lsof_output(output: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();

    for line in output.lines() {
        let cols: Vec<&str> = line.split_whitespace().collect();
        // COMMAND PID USER FD TYPE DEVICE SIZE/OFF NODE NAME...
        if cols.len() < 9 || cols[4] != "REG" {
            continue;
        }
        let full = cols[8..].join(" ");
        let Some(name) = base_name(&full) else {
            continue;
        };
        if seen.insert(name.clone()) {
            names.push(name);
        }
    }

    names
}

fn base_name(path: &str) -> Option<String> {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty())
}

/// Lists every regular file directly inside a directory, sorted by name.
pub struct DirectoryLister {
    dir: PathBuf,
}

impl DirectoryLister {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl FileLister for DirectoryLister {
    async fn list(&self) -> Result<Vec<String>> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || list_directory(&dir))
            .await
            .context("Directory listing task failed")?
    }
}

fn list_directory(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        bail!("Watched directory does not exist: {}", dir.display());
    }

    let mut names = Vec::new();
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        names.push(entry.file_name().to_string_lossy().to_string());
    }

    Ok(names)
}

/// A fixed list of names, for driving cycles without touching the OS.
pub struct StaticLister {
    names: Vec<String>,
}

impl StaticLister {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl FileLister for StaticLister {
    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.names.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const LSOF_SAMPLE: &str = "\
COMMAND   PID USER   FD   TYPE DEVICE SIZE/OFF    NODE NAME
bash     1201 app   cwd    DIR  253,1     4096  393217 /var/log/app
java     1377 app     5w   REG  253,1   183244  393220 /var/log/app/server.log
java     1377 app     6w   REG  253,1     9021  393221 /var/log/app/gc.log
tail     1555 app     3r   REG  253,1   183244  393220 /var/log/app/server.log
python   1600 app     4w   REG  253,1      120  393230 /var/log/app/my report.log
";

    #[test]
    fn test_parse_lsof_keeps_regular_files() {
        let names = parse_lsof_output(LSOF_SAMPLE);
        assert_eq!(names, vec!["server.log", "gc.log", "my report.log"]);
    }

    #[test]
    fn test_parse_lsof_empty() {
        assert!(parse_lsof_output("").is_empty());
        assert!(parse_lsof_output("COMMAND PID USER FD TYPE DEVICE SIZE/OFF NODE NAME\n").is_empty());
    }

    #[test]
    fn test_parse_lsof_ignores_short_rows() {
        assert!(parse_lsof_output("java 1 app 5w REG\n").is_empty());
    }

    #[test]
    fn test_interpret_lsof_exit_one_silent_is_empty() {
        let names = interpret_lsof(Path::new("/var/log/app"), false, Some(1), "", "").unwrap();
        assert!(names.is_empty());
    }

    #[test]
    fn test_interpret_lsof_exit_one_with_stderr_fails() {
        let err = interpret_lsof(
            Path::new("/var/log/app"),
            false,
            Some(1),
            "",
            "lsof: status error on /var/log/app: No such file or directory\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("No such file or directory"));
    }

    #[test]
    fn test_interpret_lsof_other_exit_fails() {
        assert!(interpret_lsof(Path::new("/var/log/app"), false, Some(2), "", "").is_err());
        assert!(interpret_lsof(Path::new("/var/log/app"), false, None, "", "").is_err());
    }

    #[test]
    fn test_interpret_lsof_nonzero_exit_with_rows_parses() {
        let names = interpret_lsof(
            Path::new("/var/log/app"),
            false,
            Some(1),
            LSOF_SAMPLE,
            "lsof: WARNING: can't stat() fuse.gvfsd-fuse file system /run/user/1000/gvfs\n",
        )
        .unwrap();
        assert_eq!(names, vec!["server.log", "gc.log", "my report.log"]);
    }

    #[test]
    fn test_interpret_lsof_success_without_rows() {
        let names = interpret_lsof(Path::new("/var/log/app"), true, Some(0), "", "").unwrap();
        assert!(names.is_empty());
    }

    fn lsof_available() -> bool {
        std::process::Command::new("lsof")
            .arg("-v")
            .output()
            .is_ok()
    }

    #[tokio::test]
    async fn test_lsof_lister_sees_only_open_files() {
        if !lsof_available() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let lister = LsofLister::new(tmp.path());
        assert!(lister.list().await.unwrap().is_empty());

        std::fs::write(tmp.path().join("closed.log"), "done\n").unwrap();
        let _open = std::fs::File::create(tmp.path().join("open.log")).unwrap();

        let names = lister.list().await.unwrap();
        assert_eq!(names, vec!["open.log"]);
    }

    #[tokio::test]
    async fn test_directory_lister_lists_regular_files_only() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("b.log"), "b\n").unwrap();
        std::fs::write(tmp.path().join("a.log"), "a\n").unwrap();
        std::fs::create_dir(tmp.path().join("nested")).unwrap();
        std::fs::write(tmp.path().join("nested").join("c.log"), "c\n").unwrap();

        let names = DirectoryLister::new(tmp.path()).list().await.unwrap();
        assert_eq!(names, vec!["a.log", "b.log"]);
    }

    #[tokio::test]
    async fn test_directory_lister_missing_dir_fails() {
        let tmp = TempDir::new().unwrap();
        let lister = DirectoryLister::new(tmp.path().join("absent"));
        assert!(lister.list().await.is_err());
    }
}
