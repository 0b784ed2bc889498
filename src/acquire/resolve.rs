//! Locating and tidying downloader output inside `downloads/`.

use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Extensions checked, in order, for `<jobId>.<ext>`.
pub const OUTPUT_EXTENSIONS: [&str; 6] = ["mp4", "mkv", "webm", "mov", "m4v", "flv"];

const PARTIAL_MARKERS: [&str; 4] = [".part", ".ytdl", ".temp", "-Frag"];

/// Transient names left by multi-fragment downloads.
pub fn is_partial(file_name: &str) -> bool {
    PARTIAL_MARKERS.iter().any(|marker| file_name.contains(marker))
}

/// Find the finished file for `job_id`: known extensions first, then any
/// non-partial `<jobId>.*` file in the directory.
pub fn resolve_output(dir: &Path, job_id: &str) -> Option<PathBuf> {
    for ext in OUTPUT_EXTENSIONS {
        let candidate = dir.join(format!("{}.{}", job_id, ext));
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    let prefix = format!("{}.", job_id);
    job_files(dir, job_id)
        .into_iter()
        .find(|path| {
            file_name(path)
                .map(|name| name.starts_with(&prefix) && !is_partial(&name))
                .unwrap_or(false)
        })
}

/// Delete every `<jobId>.*` file except `keep`: partial fragments and the
/// split formats of an attempt that failed to merge. Returns how many were
/// removed.
pub fn remove_leftovers(dir: &Path, job_id: &str, keep: &Path) -> usize {
    let kept = file_name(keep);
    remove_matching(dir, job_id, |name| kept.as_deref() != Some(name))
}

/// Delete every `<jobId>.*` artifact; returns how many were removed.
pub fn cleanup_job(dir: &Path, job_id: &str) -> usize {
    remove_matching(dir, job_id, |_| true)
}

fn remove_matching<F>(dir: &Path, job_id: &str, selected: F) -> usize
where
    F: Fn(&str) -> bool,
{
    let mut removed = 0;
    for path in job_files(dir, job_id) {
        let Some(name) = file_name(&path) else {
            continue;
        };
        if !selected(&name) {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!("Removed {}", path.display());
                removed += 1;
            }
            Err(e) => debug!("Could not remove {}: {}", path.display(), e),
        }
    }
    removed
}

/// Files directly in `dir` named `<jobId>.*`, sorted by name.
fn job_files(dir: &Path, job_id: &str) -> Vec<PathBuf> {
    let prefix = format!("{}.", job_id);
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn extension_priority_wins_over_scan() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "job1.webm");
        touch(dir.path(), "job1.mkv");
        assert_eq!(resolve_output(dir.path(), "job1"), Some(dir.path().join("job1.mkv")));
    }

    #[test]
    fn scan_finds_unlisted_extension_and_skips_partials() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "job1.mp4.part");
        touch(dir.path(), "job1.ts");
        touch(dir.path(), "job10.mp4");
        assert_eq!(resolve_output(dir.path(), "job1"), Some(dir.path().join("job1.ts")));
    }

    #[test]
    fn nothing_resolved_when_only_partials_exist() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "job1.f137.mp4.part");
        touch(dir.path(), "job1.mp4.ytdl");
        assert_eq!(resolve_output(dir.path(), "job1"), None);
    }

    #[test]
    fn leftover_cleanup_keeps_only_resolved_file() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "job1.mp4");
        touch(dir.path(), "job1.mp4.part");
        touch(dir.path(), "job1.mp4.part-Frag12");
        touch(dir.path(), "job1.temp.mp4");
        touch(dir.path(), "job1.f137.mp4");
        touch(dir.path(), "job1.f140.m4a");
        touch(dir.path(), "job10.mp4");
        touch(dir.path(), "other.mp4.part");

        assert_eq!(remove_leftovers(dir.path(), "job1", &dir.path().join("job1.mp4")), 5);
        assert!(dir.path().join("job1.mp4").exists());
        assert!(dir.path().join("job10.mp4").exists());
        assert!(dir.path().join("other.mp4.part").exists());
    }

    #[test]
    fn cleanup_removes_every_job_artifact() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "job1.mp4");
        touch(dir.path(), "job1.webm.part");
        touch(dir.path(), "job10.mp4");
        touch(dir.path(), "other.mp4");

        assert_eq!(cleanup_job(dir.path(), "job1"), 2);
        assert!(dir.path().join("job10.mp4").exists());
        assert!(dir.path().join("other.mp4").exists());
    }

    #[test]
    fn missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert_eq!(resolve_output(&missing, "job1"), None);
        assert_eq!(cleanup_job(&missing, "job1"), 0);
    }
}
