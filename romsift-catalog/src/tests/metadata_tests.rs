use super::*;
use romsift_core::ConfigError;

const JSON: &str = r#"{
    "Final Fantasy VII": { "genres": ["RPG"], "players": 1, "ratings": 4.5 },
    "Final Fantasy VII (Disc 2)": { "tags": ["Long Disc"] },
    "Final Fantasy VII (Japan) (Disc 1)": { "languages": ["Ja"] },
    "Metal Slug": { "manuals": { "en": "https://example.org/mslug-en.pdf" } }
}"#;

fn registry() -> AttributeRegistry {
    AttributeRegistry::standard()
}

#[test]
fn json_applies_title_level_entries() {
    let table = MetadataTable::from_json_str("meta.json", JSON, &registry()).unwrap();
    let mut m = Machine::new("Final Fantasy VII (USA) (Disc 1)");
    table.update(&mut m).unwrap();
    assert!(m.genres.contains("RPG"));
    assert_eq!(m.players, Some(1));
    assert_eq!(m.rating, Some(4.5));
}

#[test]
fn most_specific_key_wins() {
    let table = MetadataTable::from_json_str("meta.json", JSON, &registry()).unwrap();

    let mut by_name = Machine::new("Final Fantasy VII (Japan) (Disc 1)");
    table.update(&mut by_name).unwrap();
    assert!(by_name.languages.contains("ja"));
    assert!(by_name.genres.is_empty());

    let mut by_disc = Machine::new("Final Fantasy VII (USA) (Disc 2)");
    table.update(&mut by_disc).unwrap();
    assert!(by_disc.tags.contains("Long Disc"));
    assert!(by_disc.genres.is_empty());
}

#[test]
fn dict_values_become_manuals() {
    let table = MetadataTable::from_json_str("meta.json", JSON, &registry()).unwrap();
    let mut m = Machine::new("Metal Slug (World)");
    table.update(&mut m).unwrap();
    let manual = m.manual.expect("manual assigned");
    assert_eq!(manual.urls["en"], "https://example.org/mslug-en.pdf");
}

#[test]
fn unmatched_machine_is_untouched() {
    let table = MetadataTable::from_json_str("meta.json", JSON, &registry()).unwrap();
    let mut m = Machine::new("Tetris (USA)");
    let before = m.clone();
    table.update(&mut m).unwrap();
    assert_eq!(m, before);
}

#[test]
fn csv_columns_map_to_attributes() {
    let csv = "\
name,genres,players,controls,emulators
Super Mario Bros. (USA),Platform|Action,2,joy,
Duck Hunt (World),Shooter,1,lightgun|joy,nestopia";
    let table = MetadataTable::from_csv_str("meta.csv", csv, &registry()).unwrap();
    assert_eq!(table.len(), 2);

    let mut smb = Machine::new("Super Mario Bros. (USA)");
    table.update(&mut smb).unwrap();
    assert_eq!(smb.genres.len(), 2);
    assert_eq!(smb.players, Some(2));
    assert_eq!(smb.emulator, None);

    let mut duck = Machine::new("Duck Hunt (World)");
    table.update(&mut duck).unwrap();
    assert!(duck.controls.contains("lightgun"));
    assert_eq!(duck.emulator.as_deref(), Some("nestopia"));
}

#[test]
fn csv_requires_name_column() {
    let err = MetadataTable::from_csv_str("meta.csv", "title,genres\nA,B", &registry()).unwrap_err();
    assert!(matches!(err, CatalogError::Metadata { .. }));
}

#[test]
fn bad_values_fail_at_load() {
    let err = MetadataTable::from_csv_str("meta.csv", "name,players\nA,lots", &registry())
        .unwrap_err();
    assert!(matches!(err, CatalogError::Config(ConfigError::InvalidValue { .. })));

    let err = MetadataTable::from_json_str("m", r#"{"A": {"colour": "red"}}"#, &registry())
        .unwrap_err();
    assert!(matches!(err, CatalogError::Config(ConfigError::UnknownAttribute(_))));

    let err = MetadataTable::from_json_str("m", r#"{"A": {"names": "B"}}"#, &registry())
        .unwrap_err();
    assert!(matches!(err, CatalogError::Config(ConfigError::ReadOnly(_))));
}

#[test]
fn loads_from_disk() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("meta.json");
    std::fs::write(&path, JSON).unwrap();
    let table = MetadataTable::load_json(&path, &registry()).unwrap();
    assert_eq!(table.len(), 4);
    assert!(table.name().ends_with("meta.json"));
}
