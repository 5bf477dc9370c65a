//! HTML Report Discovery
//!
//! Engine runs leave HTML reports (execution report, timeline, MultiQC and
//! friends) scattered through the output tree. This walks a directory and
//! lists them for display.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use serde::Serialize;

/// An HTML file found under a reports directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    /// 1-based position in discovery order.
    pub id: String,
    /// File stem, without the `.html` extension.
    pub name: String,
    pub path: PathBuf,
    /// Path relative to the reports directory.
    pub short_path: PathBuf,
}

/// Recursively lists `.html` files under `reports_dir`.
///
/// Entries are visited in name order so ids are stable between calls.
/// Symlinks are not followed. A missing directory is an error.
pub fn locate_reports(reports_dir: &Path) -> io::Result<Vec<Report>> {
    if !reports_dir.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("reports directory does not exist: {}", reports_dir.display()),
        ));
    }

    let mut reports = Vec::new();
    walk(reports_dir, reports_dir, &mut reports)?;
    debug!("Found {} reports under {}", reports.len(), reports_dir.display());
    Ok(reports)
}

fn walk(root: &Path, current: &Path, reports: &mut Vec<Report>) -> io::Result<()> {
    let mut entries = fs::read_dir(current)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<Vec<_>>>()?;
    entries.sort();

    for path in entries {
        let metadata = fs::symlink_metadata(&path)?;
        if metadata.is_dir() {
            walk(root, &path, reports)?;
        } else if metadata.is_file() && is_html(&path) {
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let short_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();

            reports.push(Report {
                id: (reports.len() + 1).to_string(),
                name,
                path,
                short_path,
            });
        }
    }

    Ok(())
}

fn is_html(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("html"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_locate_reports_recursive() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("multiqc")).unwrap();
        fs::write(root.join("execution_report.html"), "<html/>").unwrap();
        fs::write(root.join("multiqc").join("multiqc_report.HTML"), "<html/>").unwrap();
        fs::write(root.join("trace.txt"), "").unwrap();

        let reports = locate_reports(root).unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].id, "1");
        assert_eq!(reports[0].name, "execution_report");
        assert_eq!(reports[0].short_path, PathBuf::from("execution_report.html"));
        assert_eq!(reports[1].id, "2");
        assert_eq!(reports[1].name, "multiqc_report");
        assert_eq!(
            reports[1].short_path,
            Path::new("multiqc").join("multiqc_report.HTML")
        );
        assert_eq!(reports[1].path, root.join("multiqc").join("multiqc_report.HTML"));
    }

    #[test]
    fn test_locate_reports_empty() {
        let temp_dir = tempdir().unwrap();
        assert!(locate_reports(temp_dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_locate_reports_missing_dir() {
        let temp_dir = tempdir().unwrap();
        let err = locate_reports(&temp_dir.path().join("nope")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
