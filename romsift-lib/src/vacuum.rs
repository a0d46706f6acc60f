//! Finding installed files that nothing references any more.
//!
//! Vacuuming never deletes anything itself; it produces `rm` commands for
//! the user to review.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use crate::template::Template;

/// Regular files under the fixed prefix of each template that render-match
/// the template but are not in `keep`. Files matching any of `others` may
/// belong to something else and are left alone. Sorted and deduplicated.
pub fn plan_vacuum(
    templates: &[Template],
    keep: &HashSet<PathBuf>,
    others: &[Template],
) -> io::Result<Vec<PathBuf>> {
    let others: Vec<_> = others.iter().map(Template::pattern).collect();
    let mut unreferenced = Vec::new();
    for template in templates {
        let Some(root) = template.static_dir() else {
            log::warn!("{template} has no fixed directory, not vacuuming it");
            continue;
        };
        if !root.is_dir() {
            log::debug!("{} does not exist yet", root.display());
            continue;
        }
        let pattern = template.pattern();
        let mut files = Vec::new();
        collect_files(&root, &mut files)?;
        unreferenced.extend(files.into_iter().filter(|path| {
            let path_str = path.to_string_lossy();
            !keep.contains(path)
                && pattern.is_match(&path_str)
                && !others.iter().any(|other| other.is_match(&path_str))
        }));
    }
    unreferenced.sort();
    unreferenced.dedup();
    Ok(unreferenced)
}

/// Recursively list regular files, not following symlinks.
fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(&entry.path(), out)?;
        } else if file_type.is_file() {
            out.push(entry.path());
        }
    }
    Ok(())
}

/// A shell command removing `path`, single-quoted.
pub fn removal_command(path: &Path) -> String {
    let quoted = path.to_string_lossy().replace('\'', r"'\''");
    format!("rm -v '{quoted}'")
}
