use romsift_catalog::{MachineIter, MemoryCatalog};
use romsift_filter::SortSpec;

use super::*;
use crate::install::CopyAction;

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn rules(entries: &[(&str, &[&str])]) -> Ruleset {
    let registry = AttributeRegistry::standard();
    Ruleset::from_expressions(&registry, entries.iter().map(|(k, v)| (*k, strings(v)))).unwrap()
}

fn romset(name: &str, catalog: Box<dyn CatalogSource>, filters: Ruleset) -> RomsetPlan {
    RomsetPlan {
        name: name.to_string(),
        catalog,
        rules: filters,
        source: Some(format!("https://example.org/{name}/{{parent}}.zip").parse().unwrap()),
        target: format!("/roms/.{name}/{{name}}.zip").parse().unwrap(),
        action: Arc::new(CopyAction),
    }
}

fn system(romsets: Vec<RomsetPlan>, order: &[(&str, SortSpec)]) -> SystemPlan {
    let registry = AttributeRegistry::standard();
    SystemPlan {
        name: "test".to_string(),
        favorites: rules(&[("names", &["Tetris (USA)"])]).with_default(None),
        sorter: CompositeSorter::from_expressions(&registry, order.iter().map(|(k, s)| (*k, s)))
            .unwrap(),
        group_key: GroupKey::from_attribute(&registry, DEFAULT_GROUP_BY).unwrap(),
        groups: GroupTable::default(),
        metadata: Vec::new(),
        romsets,
        dirs: Vec::new(),
    }
}

fn machines(romset: &str, names: &[&str]) -> Vec<Machine> {
    names
        .iter()
        .map(|n| Machine::new(*n).with_romset("test", romset))
        .collect()
}

fn region_order() -> Vec<(&'static str, SortSpec)> {
    vec![("regions", SortSpec::Values(strings(&["USA", "Europe", "Japan"])))]
}

fn names(selection: &Selection) -> Vec<&str> {
    selection
        .machines()
        .map(|(_, s)| s.machine.name.as_str())
        .collect()
}

#[test]
fn one_machine_per_group_by_region_priority() {
    let catalog = MemoryCatalog::new(
        "nointro",
        machines(
            "nointro",
            &["A (Japan)", "A (Europe)", "A (USA)", "Tetris (USA)", "Tetris (Japan)"],
        ),
    );
    let plan = system(
        vec![romset("nointro", Box::new(catalog), Ruleset::new())],
        &region_order(),
    );
    let pipeline = Pipeline::new(vec![plan], "/downloads");

    let selection = pipeline.select(&CancelFlag::new()).unwrap();
    assert_eq!(names(&selection), vec!["A (USA)", "Tetris (USA)"]);
    assert_eq!(selection.report.candidates, 5);
    assert_eq!(selection.report.passing, 5);
    assert_eq!(selection.report.selected, 2);

    let tetris = &selection.systems[0].machines[1];
    assert!(tetris.machine.favorite);
    assert!(!selection.systems[0].machines[0].machine.favorite);
    assert_eq!(tetris.target, PathBuf::from("/roms/.nointro/Tetris (USA).zip"));
    assert_eq!(
        tetris.source.as_deref(),
        Some("https://example.org/nointro/Tetris (USA).zip")
    );
}

#[test]
fn name_override_beats_priority_and_other_rules() {
    let mut list = machines("nointro", &["A (USA)", "A (Japan)"]);
    list[0].genres.insert("RPG".into());
    list[1].genres.insert("RPG".into());
    let catalog = MemoryCatalog::new("nointro", list);
    let filters = rules(&[("+names", &["A (Japan)"]), ("genres", &["Platform"])]);
    let plan = system(
        vec![romset("nointro", Box::new(catalog), filters)],
        &region_order(),
    );

    let selection = Pipeline::new(vec![plan], "/downloads")
        .select(&CancelFlag::new())
        .unwrap();
    assert_eq!(names(&selection), vec!["A (Japan)"]);
    assert_eq!(selection.report.passing, 1);
}

#[test]
fn filtered_out_dependencies_are_retained() {
    let list = vec![
        Machine::new("neogeo").with_romset("arcade", "mame"),
        Machine::new("mslug").with_romset("arcade", "mame"),
        Machine::new("mslugx")
            .with_romset("arcade", "mame")
            .with_parent("mslug")
            .with_bios("neogeo"),
    ];
    let mut bios = list[0].clone();
    bios.is_bios = true;
    let list = vec![bios, list[1].clone(), list[2].clone()];
    let catalog = MemoryCatalog::new("mame", list);
    let filters = rules(&[("bios", &["false"]), ("!names", &["mslug"])]);
    let plan = system(vec![romset("mame", Box::new(catalog), filters)], &[]);

    let selection = Pipeline::new(vec![plan], "/downloads")
        .select(&CancelFlag::new())
        .unwrap();
    let selected = &selection.systems[0].machines;
    assert_eq!(names(&selection), vec!["mslugx", "mslug", "neogeo"]);
    assert!(!selected[0].dependency);
    assert!(selected[1].dependency && selected[2].dependency);
    assert_eq!(selection.report.dependencies, 2);
}

#[test]
fn missing_parent_is_warned_once() {
    let list = vec![Machine::new("B (USA)").with_romset("test", "nointro").with_parent("Missing")];
    let catalog = MemoryCatalog::new("nointro", list);
    let plan = system(vec![romset("nointro", Box::new(catalog), Ruleset::new())], &[]);

    let selection = Pipeline::new(vec![plan], "/downloads")
        .select(&CancelFlag::new())
        .unwrap();
    assert_eq!(names(&selection), vec!["B (USA)"]);
    let dangling: Vec<_> = selection
        .report
        .warnings
        .iter()
        .filter(|w| matches!(w, Warning::DanglingReference { .. }))
        .collect();
    assert_eq!(dangling.len(), 1);
}

#[test]
fn machines_take_the_romset_they_were_read_from() {
    let list = machines("elsewhere", &["A (USA)"]);
    let catalog = MemoryCatalog::new("nointro", list);
    let empty = MemoryCatalog::new("other", Vec::new());
    let plan = system(
        vec![
            romset("other", Box::new(empty), Ruleset::new()),
            romset("nointro", Box::new(catalog), Ruleset::new()),
        ],
        &[],
    );

    let selection = Pipeline::new(vec![plan], "/downloads")
        .select(&CancelFlag::new())
        .unwrap();
    let selected = &selection.systems[0].machines[0];
    assert_eq!(selected.romset, 1);
    assert_eq!(selected.machine.romset, "nointro");
    assert_eq!(selected.target, PathBuf::from("/roms/.nointro/A (USA).zip"));
}

#[test]
fn discs_are_selected_individually() {
    let catalog = MemoryCatalog::new(
        "redump",
        machines(
            "redump",
            &[
                "FF (Japan) (Disc 1)",
                "FF (USA) (Disc 1)",
                "FF (Japan) (Disc 2)",
                "FF (USA) (Disc 2)",
                "FF (Europe) (Disc 2)",
            ],
        ),
    );
    let plan = system(
        vec![romset("redump", Box::new(catalog), Ruleset::new())],
        &region_order(),
    );
    let selection = Pipeline::new(vec![plan], "/downloads")
        .select(&CancelFlag::new())
        .unwrap();
    assert_eq!(names(&selection), vec!["FF (USA) (Disc 1)", "FF (USA) (Disc 2)"]);
}

#[test]
fn selection_is_idempotent() {
    let build = || {
        let catalog = MemoryCatalog::new(
            "nointro",
            machines("nointro", &["B (Europe)", "A (Japan)", "B (USA)", "A (Europe)"]),
        );
        let plan = system(
            vec![romset("nointro", Box::new(catalog), Ruleset::new())],
            &region_order(),
        );
        Pipeline::new(vec![plan], "/downloads")
    };
    let pipeline = build();
    let first = pipeline.select(&CancelFlag::new()).unwrap();
    let second = pipeline.select(&CancelFlag::new()).unwrap();
    assert_eq!(names(&first), names(&second));
    assert_eq!(names(&first), vec!["B (USA)", "A (Europe)"]);
}

struct BrokenRecords;

impl CatalogSource for BrokenRecords {
    fn name(&self) -> &str {
        "broken"
    }

    fn machines(&self) -> Result<MachineIter<'_>, CatalogError> {
        Ok(Box::new(
            vec![
                Ok(Machine::new("A (USA)").with_romset("test", "broken")),
                Err(CatalogError::invalid_record("game without name")),
                Ok(Machine::new("B (USA)").with_romset("test", "broken")),
            ]
            .into_iter(),
        ))
    }
}

#[test]
fn malformed_records_are_skipped_with_a_warning() {
    let plan = system(
        vec![romset("broken", Box::new(BrokenRecords), Ruleset::new())],
        &[],
    );
    let selection = Pipeline::new(vec![plan], "/downloads")
        .select(&CancelFlag::new())
        .unwrap();
    assert_eq!(selection.len(), 2);
    assert!(matches!(
        selection.report.warnings.as_slice(),
        [Warning::SkippedRecord { .. }]
    ));
}

#[test]
fn cancellation_stops_before_reading() {
    let catalog = MemoryCatalog::new("nointro", machines("nointro", &["A (USA)"]));
    let plan = system(vec![romset("nointro", Box::new(catalog), Ruleset::new())], &[]);
    let cancel = CancelFlag::new();
    cancel.cancel();
    assert!(matches!(
        Pipeline::new(vec![plan], "/downloads").select(&cancel),
        Err(PipelineError::Cancelled)
    ));
}

#[test]
fn install_tasks_share_archive_keys() {
    let list = vec![
        Machine::new("sf2").with_romset("test", "mame"),
        Machine::new("sf2ce").with_romset("test", "mame").with_parent("sf2"),
    ];
    let catalog = MemoryCatalog::new("mame", list);
    let filters = rules(&[("!names", &["sf2"])]);
    let plan = system(vec![romset("mame", Box::new(catalog), filters)], &[]);
    let pipeline = Pipeline::new(vec![plan], "/downloads");
    let selection = pipeline.select(&CancelFlag::new()).unwrap();

    let tasks = pipeline.install_tasks(&selection);
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].machine, "sf2ce");
    assert_eq!(tasks[0].archive_key, tasks[1].archive_key);
    assert_eq!(tasks[0].download, PathBuf::from("/downloads/test/mame/sf2.zip"));
    assert_eq!(tasks[0].target, PathBuf::from("/roms/.mame/sf2ce.zip"));
}

#[test]
fn from_config_fails_fast_on_bad_rules() {
    let registry = AttributeRegistry::standard();
    let actions = ActionRegistry::standard();

    let config: Config = "[systems.nes]\nfilters = { colour = [\"red\"] }".parse().unwrap();
    assert!(matches!(
        Pipeline::from_config(&config, &registry, &actions, &[]),
        Err(PipelineError::Config(ConfigError::UnknownAttribute(_)))
    ));

    let config: Config = r#"
[[systems.nes.romsets]]
name = "nointro"
catalog = "/dats/nes.dat"
target = "/roms/{nam}.zip"
"#
    .parse()
    .unwrap();
    assert!(Pipeline::from_config(&config, &registry, &actions, &[]).is_err());

    let config: Config = r#"
[[systems.nes.romsets]]
name = "nointro"
catalog = "/dats/nes.dat"
target = "/roms/{name}.zip"

[[systems.nes.romsets]]
name = "nointro"
catalog = "/dats/nes-extra.dat"
target = "/roms/extra/{name}.zip"
"#
    .parse()
    .unwrap();
    assert!(matches!(
        Pipeline::from_config(&config, &registry, &actions, &[]),
        Err(PipelineError::Load(ConfigLoadError::Invalid { .. }))
    ));

    let config: Config = "[systems.nes]".parse().unwrap();
    assert!(Pipeline::from_config(&config, &registry, &actions, &["snes".to_string()]).is_err());
    assert_eq!(
        Pipeline::from_config(&config, &registry, &actions, &["nes".to_string()])
            .unwrap()
            .systems()
            .len(),
        1
    );
}
