//! Directory synchronization.
//!
//! A system directory holds one symlink per visible machine, pointing at the
//! installed file. Reconciling a directory removes links for machines that
//! are no longer visible and creates links for new ones. Only symlinks whose
//! names match the directory's file template are ever touched; regular files
//! are left alone and reported.
//!
//! Discs of a multi-disc machine share one `.m3u` playlist, written next to
//! the installed discs, and the directory gets a single link to it.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use romsift_core::Machine;
use romsift_filter::Ruleset;

use crate::template::{PLAYLIST_EXTENSION, Template, strip_disc_tag};

/// What a path currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
}

/// The filesystem operations reconciliation needs.
pub trait FileSystem {
    /// Kind of the entry at `path` without following symlinks, or `None`
    /// when nothing is there.
    fn entry_kind(&self, path: &Path) -> io::Result<Option<EntryKind>>;

    /// Kind of the entry at `path` after following symlinks, or `None` when
    /// nothing is there or the link dangles. Never returns `Symlink`.
    fn resolved_kind(&self, path: &Path) -> io::Result<Option<EntryKind>>;

    /// Full paths of the entries directly inside `dir`.
    fn read_dir(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;

    fn read_link(&self, path: &Path) -> io::Result<PathBuf>;

    /// File contents, or `None` when the file doesn't exist.
    fn read_to_string(&self, path: &Path) -> io::Result<Option<String>>;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()>;

    fn remove_link(&self, path: &Path) -> io::Result<()>;

    fn write(&self, path: &Path, contents: &str) -> io::Result<()>;
}

/// [`FileSystem`] backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn entry_kind(&self, path: &Path) -> io::Result<Option<EntryKind>> {
        match std::fs::symlink_metadata(path) {
            Ok(meta) => {
                let kind = if meta.file_type().is_symlink() {
                    EntryKind::Symlink
                } else if meta.is_dir() {
                    EntryKind::Dir
                } else {
                    EntryKind::File
                };
                Ok(Some(kind))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn resolved_kind(&self, path: &Path) -> io::Result<Option<EntryKind>> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_dir() => Ok(Some(EntryKind::Dir)),
            Ok(_) => Ok(Some(EntryKind::File)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn read_dir(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = std::fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<io::Result<Vec<_>>>()?;
        entries.sort();
        Ok(entries)
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        std::fs::read_link(path)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<Option<String>> {
        match std::fs::read_to_string(path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    #[cfg(unix)]
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        std::os::unix::fs::symlink(target, link)
    }

    #[cfg(windows)]
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        std::os::windows::fs::symlink_file(target, link)
    }

    fn remove_link(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, path)
    }
}

/// A directory of symlinks with its own visibility rules.
#[derive(Debug, Clone)]
pub struct SystemDir {
    pub path: PathBuf,
    /// File name template for links inside `path`.
    pub file: Template,
    /// Write link targets relative to `path`.
    pub relative: bool,
    pub rules: Ruleset,
}

/// A selected machine and the file it was installed to.
#[derive(Debug, Clone, Copy)]
pub struct SyncEntry<'a> {
    pub machine: &'a Machine,
    pub installed: &'a Path,
}

/// What one reconcile pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub created: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    /// Playlists written or rewritten.
    pub playlists: Vec<PathBuf>,
    /// Paths left alone because they are not symlinks.
    pub skipped: Vec<PathBuf>,
    pub unchanged: usize,
}

impl SyncSummary {
    /// Number of filesystem mutations performed.
    pub fn changes(&self) -> usize {
        self.created.len() + self.removed.len() + self.playlists.len()
    }
}

/// Applies reconcile passes through a [`FileSystem`].
#[derive(Debug, Clone, Default)]
pub struct DirectorySynchronizer<F> {
    fs: F,
}

impl<F: FileSystem> DirectorySynchronizer<F> {
    pub fn new(fs: F) -> Self {
        Self { fs }
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    /// Make `dir` contain exactly one link per machine in `entries` that its
    /// rules allow. Running it again with the same input changes nothing.
    pub fn reconcile(&self, dir: &SystemDir, entries: &[SyncEntry<'_>]) -> io::Result<SyncSummary> {
        let mut summary = SyncSummary::default();
        let allowed: Vec<&SyncEntry<'_>> = entries
            .iter()
            .filter(|e| dir.rules.evaluate(e.machine).is_some())
            .collect();
        log::debug!(
            "{}: {} of {} machines visible",
            dir.path.display(),
            allowed.len(),
            entries.len()
        );

        let expected = self.expected_links(dir, &allowed, &mut summary)?;

        // The directory itself may be a symlink to the real one.
        match self.fs.resolved_kind(&dir.path)? {
            Some(EntryKind::Dir) => self.remove_stale(dir, &expected, &mut summary)?,
            None if self.fs.entry_kind(&dir.path)?.is_none() => {
                self.fs.create_dir_all(&dir.path)?
            }
            _ => {
                log::warn!("{} is not a directory, skipping", dir.path.display());
                summary.skipped.push(dir.path.clone());
                return Ok(summary);
            }
        }

        for (link, target) in &expected {
            let target = if dir.relative {
                pathdiff::diff_paths(target, &dir.path).unwrap_or_else(|| target.clone())
            } else {
                target.clone()
            };

            match self.fs.entry_kind(link)? {
                None => {}
                Some(EntryKind::Symlink) => {
                    if self.fs.read_link(link)? == target {
                        summary.unchanged += 1;
                        continue;
                    }
                    self.fs.remove_link(link)?;
                }
                Some(_) => {
                    log::warn!("{} exists and is not a symlink, leaving it alone", link.display());
                    summary.skipped.push(link.clone());
                    continue;
                }
            }

            self.fs.symlink(&target, link)?;
            log::debug!("Linked {} -> {}", link.display(), target.display());
            summary.created.push(link.clone());
        }

        Ok(summary)
    }

    /// Link path → absolute target for every visible machine. Playlists are
    /// written here when their contents changed.
    fn expected_links(
        &self,
        dir: &SystemDir,
        allowed: &[&SyncEntry<'_>],
        summary: &mut SyncSummary,
    ) -> io::Result<BTreeMap<PathBuf, PathBuf>> {
        let mut links = BTreeMap::new();
        // Discs of one game, keyed by romset and group so discs picked from
        // different regions still share a playlist.
        let mut games: BTreeMap<(&str, &str), Vec<&SyncEntry<'_>>> = BTreeMap::new();

        for &entry in allowed {
            if entry.machine.is_playlist_member() {
                games
                    .entry((entry.machine.romset.as_str(), entry.machine.group_name.as_str()))
                    .or_default()
                    .push(entry);
                continue;
            }

            let link = dir.path.join(dir.file.render(entry.machine));
            if let Some(previous) = links.insert(link.clone(), entry.installed.to_path_buf()) {
                log::warn!(
                    "{} maps to more than one machine; keeping {}",
                    link.display(),
                    entry.installed.display()
                );
                log::debug!("Dropped {}", previous.display());
            }
        }

        let playlist_file = dir.file.with_extension(PLAYLIST_EXTENSION);
        for mut discs in games.into_values() {
            discs.sort_by(|a, b| a.machine.disc_title.cmp(&b.machine.disc_title));
            // Names come from the first disc.
            let Some(&first) = discs.first() else {
                continue;
            };
            let link = dir
                .path
                .join(strip_disc_tag(&playlist_file.render(first.machine)));
            let file_name = strip_disc_tag(&format!(
                "{}.{PLAYLIST_EXTENSION}",
                file_stem(first.installed)
            ));
            let playlist = first.installed.with_file_name(file_name);

            let contents: String = discs
                .iter()
                .filter_map(|d| d.installed.file_name())
                .map(|name| format!("{}\n", name.to_string_lossy()))
                .collect();
            if self.fs.read_to_string(&playlist)?.as_deref() != Some(contents.as_str()) {
                self.fs.write(&playlist, &contents)?;
                log::debug!("Wrote playlist {}", playlist.display());
                summary.playlists.push(playlist.clone());
            }
            links.insert(link, playlist);
        }

        Ok(links)
    }

    /// Remove template-matching symlinks that are not expected.
    fn remove_stale(
        &self,
        dir: &SystemDir,
        expected: &BTreeMap<PathBuf, PathBuf>,
        summary: &mut SyncSummary,
    ) -> io::Result<()> {
        let file_pattern = dir.file.pattern();
        let playlist_pattern = dir.file.with_extension(PLAYLIST_EXTENSION).pattern();

        for path in self.fs.read_dir(&dir.path)? {
            if expected.contains_key(&path) {
                continue;
            }
            let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
                continue;
            };
            if !file_pattern.is_match(&name) && !playlist_pattern.is_match(&name) {
                continue;
            }
            if self.fs.entry_kind(&path)? == Some(EntryKind::Symlink) {
                self.fs.remove_link(&path)?;
                log::debug!("Removed {}", path.display());
                summary.removed.push(path);
            }
        }
        Ok(())
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "tests/sync_tests.rs"]
mod tests;
