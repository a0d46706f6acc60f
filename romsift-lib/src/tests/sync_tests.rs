use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use romsift_core::AttributeRegistry;

use super::*;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    File(String),
    Dir,
    Link(PathBuf),
}

/// In-memory filesystem that counts mutating calls.
#[derive(Default)]
struct FakeFs {
    nodes: RefCell<BTreeMap<PathBuf, Node>>,
    mutations: Cell<usize>,
}

impl FakeFs {
    fn with_dir(path: &str) -> Self {
        let fs = Self::default();
        fs.nodes.borrow_mut().insert(PathBuf::from(path), Node::Dir);
        fs
    }

    fn put(&self, path: &str, node: Node) {
        self.nodes.borrow_mut().insert(PathBuf::from(path), node);
    }

    fn node(&self, path: &str) -> Option<Node> {
        self.nodes.borrow().get(Path::new(path)).cloned()
    }

    fn mutated(&self) {
        self.mutations.set(self.mutations.get() + 1);
    }
}

impl FileSystem for FakeFs {
    fn entry_kind(&self, path: &Path) -> io::Result<Option<EntryKind>> {
        Ok(self.nodes.borrow().get(path).map(|n| match n {
            Node::File(_) => EntryKind::File,
            Node::Dir => EntryKind::Dir,
            Node::Link(_) => EntryKind::Symlink,
        }))
    }

    fn resolved_kind(&self, path: &Path) -> io::Result<Option<EntryKind>> {
        let mut path = path.to_path_buf();
        loop {
            match self.nodes.borrow().get(&path) {
                Some(Node::File(_)) => return Ok(Some(EntryKind::File)),
                Some(Node::Dir) => return Ok(Some(EntryKind::Dir)),
                Some(Node::Link(target)) => path = target.clone(),
                None => return Ok(None),
            }
        }
    }

    fn read_dir(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        Ok(self
            .nodes
            .borrow()
            .keys()
            .filter(|p| p.parent() == Some(dir))
            .cloned()
            .collect())
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        match self.nodes.borrow().get(path) {
            Some(Node::Link(target)) => Ok(target.clone()),
            _ => Err(io::Error::new(io::ErrorKind::InvalidInput, "not a link")),
        }
    }

    fn read_to_string(&self, path: &Path) -> io::Result<Option<String>> {
        Ok(match self.nodes.borrow().get(path) {
            Some(Node::File(contents)) => Some(contents.clone()),
            _ => None,
        })
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.mutated();
        self.nodes.borrow_mut().insert(path.to_path_buf(), Node::Dir);
        Ok(())
    }

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        self.mutated();
        self.nodes
            .borrow_mut()
            .insert(link.to_path_buf(), Node::Link(target.to_path_buf()));
        Ok(())
    }

    fn remove_link(&self, path: &Path) -> io::Result<()> {
        self.mutated();
        self.nodes.borrow_mut().remove(path);
        Ok(())
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        self.mutated();
        self.nodes
            .borrow_mut()
            .insert(path.to_path_buf(), Node::File(contents.to_string()));
        Ok(())
    }
}

fn system_dir(rules: &[(&str, &[&str])]) -> SystemDir {
    let registry = AttributeRegistry::standard();
    SystemDir {
        path: PathBuf::from("/roms/nes"),
        file: "{name}.zip".parse().unwrap(),
        relative: false,
        rules: Ruleset::from_expressions(
            &registry,
            rules
                .iter()
                .map(|(k, v)| (*k, v.iter().map(|s| s.to_string()).collect::<Vec<_>>())),
        )
        .unwrap(),
    }
}

fn game(name: &str, controls: &[&str]) -> Machine {
    let mut m = Machine::new(name).with_romset("nes", "nointro");
    m.controls = controls.iter().map(|c| c.to_string()).collect();
    m
}

fn installed(machine: &Machine) -> PathBuf {
    PathBuf::from(format!("/install/nes/{}.zip", machine.name))
}

#[test]
fn dir_rules_decide_visibility() {
    let machines = [game("X (USA)", &["joy"]), game("Y (USA)", &["keyboard"])];
    let paths: Vec<PathBuf> = machines.iter().map(installed).collect();
    let entries: Vec<SyncEntry<'_>> = machines
        .iter()
        .zip(&paths)
        .map(|(machine, installed)| SyncEntry { machine, installed })
        .collect();

    let sync = DirectorySynchronizer::new(FakeFs::with_dir("/roms/nes"));
    let dir = system_dir(&[("controls", &["joy"])]);
    let summary = sync.reconcile(&dir, &entries).unwrap();

    assert_eq!(summary.created, vec![PathBuf::from("/roms/nes/X (USA).zip")]);
    assert_eq!(
        sync.fs().node("/roms/nes/X (USA).zip"),
        Some(Node::Link(PathBuf::from("/install/nes/X (USA).zip")))
    );
    assert_eq!(sync.fs().node("/roms/nes/Y (USA).zip"), None);

    let before = sync.fs().mutations.get();
    let again = sync.reconcile(&dir, &entries).unwrap();
    assert_eq!(again.changes(), 0);
    assert_eq!(again.unchanged, 1);
    assert_eq!(sync.fs().mutations.get(), before);
}

#[test]
fn removes_stale_links_but_not_regular_files() {
    let fs = FakeFs::with_dir("/roms/nes");
    fs.put("/roms/nes/Old (USA).zip", Node::Link("/install/nes/Old (USA).zip".into()));
    fs.put("/roms/nes/Saves (USA).zip", Node::File("data".into()));
    fs.put("/roms/nes/readme.txt", Node::Link("/elsewhere".into()));

    let machine = game("New (USA)", &[]);
    let path = installed(&machine);
    let sync = DirectorySynchronizer::new(fs);
    let summary = sync
        .reconcile(
            &system_dir(&[]),
            &[SyncEntry {
                machine: &machine,
                installed: &path,
            }],
        )
        .unwrap();

    assert_eq!(summary.removed, vec![PathBuf::from("/roms/nes/Old (USA).zip")]);
    assert_eq!(summary.created, vec![PathBuf::from("/roms/nes/New (USA).zip")]);
    assert_eq!(sync.fs().node("/roms/nes/Saves (USA).zip"), Some(Node::File("data".into())));
    // Names outside the template are never touched.
    assert!(sync.fs().node("/roms/nes/readme.txt").is_some());
}

#[test]
fn regular_file_in_the_way_is_skipped() {
    let fs = FakeFs::with_dir("/roms/nes");
    fs.put("/roms/nes/A (USA).zip", Node::File("real rom".into()));
    let machine = game("A (USA)", &[]);
    let path = installed(&machine);
    let sync = DirectorySynchronizer::new(fs);

    let summary = sync
        .reconcile(
            &system_dir(&[]),
            &[SyncEntry {
                machine: &machine,
                installed: &path,
            }],
        )
        .unwrap();
    assert!(summary.created.is_empty());
    assert_eq!(summary.skipped, vec![PathBuf::from("/roms/nes/A (USA).zip")]);
    assert_eq!(sync.fs().node("/roms/nes/A (USA).zip"), Some(Node::File("real rom".into())));
}

#[test]
fn repoints_link_with_wrong_target() {
    let fs = FakeFs::with_dir("/roms/nes");
    fs.put("/roms/nes/A (USA).zip", Node::Link("/old/place.zip".into()));
    let machine = game("A (USA)", &[]);
    let path = installed(&machine);
    let sync = DirectorySynchronizer::new(fs);

    let summary = sync
        .reconcile(
            &system_dir(&[]),
            &[SyncEntry {
                machine: &machine,
                installed: &path,
            }],
        )
        .unwrap();
    assert_eq!(summary.created.len(), 1);
    assert_eq!(
        sync.fs().node("/roms/nes/A (USA).zip"),
        Some(Node::Link(path.clone()))
    );
}

#[test]
fn creates_missing_directory_with_relative_links() {
    let machine = game("A (USA)", &[]);
    let path = installed(&machine);
    let mut dir = system_dir(&[]);
    dir.relative = true;
    let sync = DirectorySynchronizer::new(FakeFs::default());

    sync.reconcile(
        &dir,
        &[SyncEntry {
            machine: &machine,
            installed: &path,
        }],
    )
    .unwrap();
    assert_eq!(sync.fs().node("/roms/nes"), Some(Node::Dir));
    assert_eq!(
        sync.fs().node("/roms/nes/A (USA).zip"),
        Some(Node::Link("../../install/nes/A (USA).zip".into()))
    );
}

#[test]
fn discs_share_one_playlist_link() {
    let discs = [
        game("FF (USA) (Disc 2)", &[]),
        game("FF (USA) (Disc 1)", &[]),
    ];
    let paths: Vec<PathBuf> = discs.iter().map(installed).collect();
    let entries: Vec<SyncEntry<'_>> = discs
        .iter()
        .zip(&paths)
        .map(|(machine, installed)| SyncEntry { machine, installed })
        .collect();
    let sync = DirectorySynchronizer::new(FakeFs::with_dir("/roms/nes"));
    let dir = system_dir(&[]);

    let summary = sync.reconcile(&dir, &entries).unwrap();
    assert_eq!(summary.playlists, vec![PathBuf::from("/install/nes/FF (USA).m3u")]);
    assert_eq!(
        sync.fs().node("/install/nes/FF (USA).m3u"),
        Some(Node::File("FF (USA) (Disc 1).zip\nFF (USA) (Disc 2).zip\n".into()))
    );
    assert_eq!(summary.created, vec![PathBuf::from("/roms/nes/FF (USA).m3u")]);
    assert_eq!(sync.fs().node("/roms/nes/FF (USA) (Disc 1).zip"), None);

    let again = sync.reconcile(&dir, &entries).unwrap();
    assert_eq!(again.changes(), 0);
}

#[test]
fn discs_from_different_regions_share_one_playlist() {
    let discs = [
        game("Game (Europe) (Disc 2)", &[]),
        game("Game (USA) (Disc 1)", &[]),
    ];
    let paths: Vec<PathBuf> = discs.iter().map(installed).collect();
    let entries: Vec<SyncEntry<'_>> = discs
        .iter()
        .zip(&paths)
        .map(|(machine, installed)| SyncEntry { machine, installed })
        .collect();
    let sync = DirectorySynchronizer::new(FakeFs::with_dir("/roms/nes"));

    let summary = sync.reconcile(&system_dir(&[]), &entries).unwrap();
    assert_eq!(summary.created, vec![PathBuf::from("/roms/nes/Game (USA).m3u")]);
    assert_eq!(summary.playlists, vec![PathBuf::from("/install/nes/Game (USA).m3u")]);
    assert_eq!(
        sync.fs().node("/install/nes/Game (USA).m3u"),
        Some(Node::File(
            "Game (USA) (Disc 1).zip\nGame (Europe) (Disc 2).zip\n".into()
        ))
    );
    assert_eq!(sync.fs().node("/roms/nes/Game (Europe).m3u"), None);
}

#[test]
fn symlinked_directory_is_synced() {
    let fs = FakeFs::with_dir("/mnt/nes");
    fs.put("/roms/nes", Node::Link("/mnt/nes".into()));
    let machine = game("A (USA)", &[]);
    let path = installed(&machine);
    let sync = DirectorySynchronizer::new(fs);

    let summary = sync
        .reconcile(
            &system_dir(&[]),
            &[SyncEntry {
                machine: &machine,
                installed: &path,
            }],
        )
        .unwrap();
    assert!(summary.skipped.is_empty());
    assert_eq!(summary.created, vec![PathBuf::from("/roms/nes/A (USA).zip")]);
}

#[test]
fn dangling_directory_link_is_skipped() {
    let fs = FakeFs::default();
    fs.put("/roms/nes", Node::Link("/mnt/gone".into()));
    let machine = game("A (USA)", &[]);
    let path = installed(&machine);
    let sync = DirectorySynchronizer::new(fs);

    let summary = sync
        .reconcile(
            &system_dir(&[]),
            &[SyncEntry {
                machine: &machine,
                installed: &path,
            }],
        )
        .unwrap();
    assert_eq!(summary.skipped, vec![PathBuf::from("/roms/nes")]);
    assert_eq!(sync.fs().mutations.get(), 0);
}

#[test]
fn path_that_is_not_a_directory_is_skipped() {
    let fs = FakeFs::default();
    fs.put("/roms/nes", Node::File(String::new()));
    let machine = game("A (USA)", &[]);
    let path = installed(&machine);
    let sync = DirectorySynchronizer::new(fs);

    let summary = sync
        .reconcile(
            &system_dir(&[]),
            &[SyncEntry {
                machine: &machine,
                installed: &path,
            }],
        )
        .unwrap();
    assert_eq!(summary.skipped, vec![PathBuf::from("/roms/nes")]);
    assert_eq!(sync.fs().mutations.get(), 0);
}

#[cfg(unix)]
#[test]
fn local_filesystem_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let install = tmp.path().join("install");
    std::fs::create_dir_all(&install).unwrap();
    let machines = [game("X (USA)", &["joy"]), game("Y (USA)", &["keyboard"])];
    let paths: Vec<PathBuf> = machines
        .iter()
        .map(|m| {
            let p = install.join(format!("{}.zip", m.name));
            std::fs::write(&p, b"rom").unwrap();
            p
        })
        .collect();
    let entries: Vec<SyncEntry<'_>> = machines
        .iter()
        .zip(&paths)
        .map(|(machine, installed)| SyncEntry { machine, installed })
        .collect();

    let mut dir = system_dir(&[("controls", &["joy"])]);
    dir.path = tmp.path().join("links");
    dir.relative = true;
    let sync = DirectorySynchronizer::new(LocalFileSystem);

    let summary = sync.reconcile(&dir, &entries).unwrap();
    assert_eq!(summary.created.len(), 1);
    let link = dir.path.join("X (USA).zip");
    assert_eq!(std::fs::read(&link).unwrap(), b"rom");
    assert!(!dir.path.join("Y (USA).zip").exists());

    assert_eq!(sync.reconcile(&dir, &entries).unwrap().changes(), 0);
}

#[cfg(unix)]
#[test]
fn local_filesystem_follows_a_symlinked_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let real = tmp.path().join("real");
    std::fs::create_dir_all(&real).unwrap();
    let links = tmp.path().join("nes");
    std::os::unix::fs::symlink(&real, &links).unwrap();
    let machine = game("X (USA)", &[]);
    let path = tmp.path().join("X (USA).zip");
    std::fs::write(&path, b"rom").unwrap();

    let mut dir = system_dir(&[]);
    dir.path = links.clone();
    let sync = DirectorySynchronizer::new(LocalFileSystem);
    let summary = sync
        .reconcile(
            &dir,
            &[SyncEntry {
                machine: &machine,
                installed: &path,
            }],
        )
        .unwrap();

    assert_eq!(summary.created, vec![links.join("X (USA).zip")]);
    assert_eq!(std::fs::read(real.join("X (USA).zip")).unwrap(), b"rom");
}
