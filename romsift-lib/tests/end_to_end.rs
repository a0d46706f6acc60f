use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use romsift_core::AttributeRegistry;
use romsift_lib::{
    ActionRegistry, CancelFlag, Config, DirectorySynchronizer, HttpDownloader, InstallOptions,
    InstallStatus, Installer, LocalFileSystem, Pipeline, PipelineReport,
};
use tempfile::TempDir;

const DAT: &str = r#"<?xml version="1.0"?>
<datafile>
    <game name="Zelda (Japan)"><description>Zelda (Japan)</description></game>
    <game name="Zelda (USA)"><description>Zelda (USA)</description></game>
    <game name="Mario (USA) (Beta)"><description>Mario (USA) (Beta)</description></game>
    <game name="Tetris (USA)"><description>Tetris (USA)</description></game>
</datafile>"#;

const METADATA: &str = r#"{ "Zelda": { "controls": ["joy"], "genres": ["Adventure"] } }"#;

fn setup() -> (TempDir, Config) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let mirror = root.join("mirror");
    fs::create_dir_all(&mirror).unwrap();
    for name in ["Zelda (Japan)", "Zelda (USA)", "Mario (USA) (Beta)", "Tetris (USA)"] {
        fs::write(mirror.join(format!("{name}.zip")), name).unwrap();
    }
    fs::write(root.join("nes.dat"), DAT).unwrap();
    fs::write(root.join("nes.json"), METADATA).unwrap();

    let p = |rel: &str| root.join(rel).display().to_string();
    let toml = format!(
        r#"
[settings]
workers = 2
retry_delay_secs = 0
download_dir = '{downloads}'

[defaults]
filters = {{ "!flags" = ["Beta", "Proto"] }}

[systems.nes.priority.order]
regions = ["USA", "Europe", "Japan"]

[[systems.nes.romsets]]
name = "nointro"
catalog = '{dat}'
source = '{mirror}/{{name}}.zip'
target = '{roms}/{{name}}.zip'

[[systems.nes.metadata]]
kind = "json"
path = '{meta}'

[[systems.nes.dirs]]
path = '{links}'
file = "{{title}}.zip"
filters = {{ controls = ["joy"] }}
"#,
        downloads = p("downloads"),
        dat = p("nes.dat"),
        mirror = p("mirror"),
        roms = p("roms/.nes"),
        meta = p("nes.json"),
        links = p("links/nes"),
    );
    let config = toml.parse().unwrap();
    (tmp, config)
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

#[test]
fn select_install_organize_and_vacuum() {
    let (tmp, config) = setup();
    let root = tmp.path();
    let registry = AttributeRegistry::standard();
    let pipeline = Pipeline::from_config(&config, &registry, &ActionRegistry::standard(), &[]).unwrap();

    let selection = pipeline.select(&CancelFlag::new()).unwrap();
    let names: Vec<&str> = selection.machines().map(|(_, s)| s.machine.name.as_str()).collect();
    assert_eq!(names, vec!["Zelda (USA)", "Tetris (USA)"]);
    assert_eq!(selection.report.candidates, 4);
    assert_eq!(selection.report.passing, 3);

    let options = InstallOptions {
        workers: config.settings.workers,
        attempts: config.settings.retries,
        retry_delay: Duration::from_secs(config.settings.retry_delay_secs),
        force: false,
    };
    let downloader = Arc::new(HttpDownloader::new(Duration::from_secs(5)).unwrap());
    let installer = Installer::new(downloader, options, CancelFlag::new());
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let outcomes = runtime.block_on(installer.run(pipeline.install_tasks(&selection), |_| {}));
    assert!(outcomes.iter().all(|o| matches!(o.result, Ok(InstallStatus::Installed))));
    assert_eq!(read(&root.join("roms/.nes/Zelda (USA).zip")), "Zelda (USA)");

    // A second run finds everything in place.
    let again = runtime.block_on(installer.run(pipeline.install_tasks(&selection), |_| {}));
    assert!(again.iter().all(|o| matches!(o.result, Ok(InstallStatus::AlreadyPresent))));

    let sync = DirectorySynchronizer::new(LocalFileSystem);
    let mut report = PipelineReport::default();
    let summaries = pipeline.organize(&selection, &sync, &mut report);
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].1.created.len(), 1);
    assert_eq!(read(&root.join("links/nes/Zelda.zip")), "Zelda (USA)");
    assert!(!root.join("links/nes/Tetris.zip").exists());
    assert!(report.warnings.is_empty());

    let summaries = pipeline.organize(&selection, &sync, &mut report);
    assert_eq!(summaries[0].1.changes(), 0);

    fs::write(root.join("roms/.nes/Old (USA).zip"), "stale").unwrap();
    let unreferenced = pipeline.vacuum(&selection).unwrap();
    assert_eq!(unreferenced, vec![root.join("roms/.nes/Old (USA).zip")]);
}

#[test]
fn organize_warns_about_missing_installs() {
    let (_tmp, config) = setup();
    let registry = AttributeRegistry::standard();
    let pipeline = Pipeline::from_config(&config, &registry, &ActionRegistry::standard(), &[]).unwrap();
    let selection = pipeline.select(&CancelFlag::new()).unwrap();

    let mut report = PipelineReport::default();
    let summaries = pipeline.organize(&selection, &DirectorySynchronizer::new(LocalFileSystem), &mut report);
    assert_eq!(report.warnings.len(), 2);
    assert!(summaries[0].1.created.is_empty());
}

fn two_systems(target: &str) -> (TempDir, Config) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    fs::write(root.join("nes.dat"), DAT).unwrap();
    fs::write(root.join("snes.dat"), DAT).unwrap();
    let p = |rel: &str| root.join(rel).display().to_string();
    let toml = format!(
        r#"
[[systems.nes.romsets]]
name = "nointro"
catalog = '{nes}'
target = '{target}'

[[systems.snes.romsets]]
name = "nointro"
catalog = '{snes}'
target = '{target}'
"#,
        nes = p("nes.dat"),
        snes = p("snes.dat"),
        target = format!("{}/{target}", root.display()),
    );
    let config = toml.parse().unwrap();
    (tmp, config)
}

#[test]
fn vacuum_of_one_system_leaves_the_others_files() {
    let (tmp, config) = two_systems("roms/{system}/{name}.zip");
    let root = tmp.path();
    for dir in ["roms/nes", "roms/snes"] {
        fs::create_dir_all(root.join(dir)).unwrap();
        fs::write(root.join(dir).join("Old (USA).zip"), "stale").unwrap();
    }
    let registry = AttributeRegistry::standard();
    let only = vec!["nes".to_string()];
    let pipeline = Pipeline::from_config(&config, &registry, &ActionRegistry::standard(), &only).unwrap();
    let selection = pipeline.select(&CancelFlag::new()).unwrap();

    let unreferenced = pipeline.vacuum(&selection).unwrap();
    assert_eq!(unreferenced, vec![root.join("roms/nes/Old (USA).zip")]);
}

#[test]
fn vacuum_skips_files_another_system_could_own() {
    let (tmp, config) = two_systems("roms/{name}.zip");
    let root = tmp.path();
    fs::create_dir_all(root.join("roms")).unwrap();
    fs::write(root.join("roms/Old (USA).zip"), "stale").unwrap();
    let registry = AttributeRegistry::standard();
    let actions = ActionRegistry::standard();

    let only = vec!["nes".to_string()];
    let pipeline = Pipeline::from_config(&config, &registry, &actions, &only).unwrap();
    let selection = pipeline.select(&CancelFlag::new()).unwrap();
    assert!(pipeline.vacuum(&selection).unwrap().is_empty());

    // With every system selected the file is known to be unreferenced.
    let pipeline = Pipeline::from_config(&config, &registry, &actions, &[]).unwrap();
    let selection = pipeline.select(&CancelFlag::new()).unwrap();
    assert_eq!(pipeline.vacuum(&selection).unwrap(), vec![root.join("roms/Old (USA).zip")]);
}
