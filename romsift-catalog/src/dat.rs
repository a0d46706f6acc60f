use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use romsift_core::Machine;

use crate::error::CatalogError;

/// Boxed stream of machines produced by a [`CatalogSource`].
pub type MachineIter<'a> = Box<dyn Iterator<Item = Result<Machine, CatalogError>> + Send + 'a>;

/// A romset catalog that can be streamed any number of times.
///
/// Every call to [`machines`](Self::machines) starts a fresh pass. Items are
/// produced lazily; an `Err` that [is recoverable](CatalogError::is_recoverable)
/// only affects that one record.
pub trait CatalogSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    fn machines(&self) -> Result<MachineIter<'_>, CatalogError>;
}

/// Logiqx / MAME XML catalog read from disk.
#[derive(Debug, Clone)]
pub struct DatCatalog {
    path: PathBuf,
    system: String,
    romset: String,
}

impl DatCatalog {
    pub fn new(path: impl Into<PathBuf>, system: impl Into<String>, romset: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            system: system.into(),
            romset: romset.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CatalogSource for DatCatalog {
    fn name(&self) -> &str {
        &self.romset
    }

    fn machines(&self) -> Result<MachineIter<'_>, CatalogError> {
        let file = File::open(&self.path)
            .map_err(|e| CatalogError::io(self.path.display().to_string(), e))?;
        Ok(Box::new(DatReader::new(
            BufReader::new(file),
            &self.system,
            &self.romset,
        )))
    }
}

/// Catalog backed by machines already in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    name: String,
    machines: Vec<Machine>,
}

impl MemoryCatalog {
    pub fn new(name: impl Into<String>, machines: Vec<Machine>) -> Self {
        Self {
            name: name.into(),
            machines,
        }
    }
}

impl CatalogSource for MemoryCatalog {
    fn name(&self) -> &str {
        &self.name
    }

    fn machines(&self) -> Result<MachineIter<'_>, CatalogError> {
        Ok(Box::new(self.machines.iter().cloned().map(Ok)))
    }
}

// ---------------------------------------------------------------------------
// Streaming XML reader
// ---------------------------------------------------------------------------

/// Lazily reads `<game>` / `<machine>` elements from a DAT document.
pub struct DatReader<R> {
    xml: Reader<R>,
    system: String,
    romset: String,
    done: bool,
}

#[derive(Debug, Clone, Copy)]
enum TextField {
    Description,
    Year,
    Manufacturer,
}

/// A record being assembled. Errors are held until the closing tag so the
/// reader stays in sync with the document.
struct Record {
    result: Result<Machine, String>,
    text: Option<TextField>,
}

impl<R: BufRead> DatReader<R> {
    pub fn new(reader: R, system: impl Into<String>, romset: impl Into<String>) -> Self {
        let mut xml = Reader::from_reader(reader);
        xml.config_mut().trim_text(true);
        Self {
            xml,
            system: system.into(),
            romset: romset.into(),
            done: false,
        }
    }

    fn next_record(&mut self) -> Result<Option<Machine>, CatalogError> {
        let mut buf = Vec::new();
        let mut record: Option<Record> = None;

        loop {
            match self.xml.read_event_into(&mut buf)? {
                Event::Start(ref e) => {
                    if let Some(current) = record.as_mut() {
                        current.text = match e.name().as_ref() {
                            b"description" => Some(TextField::Description),
                            b"year" => Some(TextField::Year),
                            b"manufacturer" => Some(TextField::Manufacturer),
                            _ => {
                                apply_child(current, e);
                                None
                            }
                        };
                    } else if is_record_tag(e) {
                        record = Some(self.start_record(e));
                    }
                }
                Event::Empty(ref e) => {
                    if let Some(current) = record.as_mut() {
                        apply_child(current, e);
                    } else if is_record_tag(e) {
                        return finish(self.start_record(e)).map(Some);
                    }
                }
                Event::Text(ref t) => {
                    if let Some(current) = &mut record {
                        if let Some(field) = current.text {
                            let text = t.unescape()?.into_owned();
                            apply_text(current, field, text);
                        }
                    }
                }
                Event::End(ref e) => {
                    if is_record_tag_name(e.name().as_ref()) {
                        if let Some(done) = record.take() {
                            return finish(done).map(Some);
                        }
                    } else if let Some(current) = record.as_mut() {
                        current.text = None;
                    }
                }
                Event::Eof => {
                    return match record {
                        Some(_) => Err(CatalogError::invalid_record(
                            "truncated record at end of file",
                        )),
                        None => Ok(None),
                    };
                }
                _ => {}
            }
            buf.clear();
        }
    }

    fn start_record(&self, e: &BytesStart<'_>) -> Record {
        let result = self.read_record_attributes(e);
        Record { result, text: None }
    }

    fn read_record_attributes(&self, e: &BytesStart<'_>) -> Result<Machine, String> {
        let mut name = None;
        let mut cloneof = None;
        let mut romof = None;
        let mut is_bios = false;
        let mut is_device = false;
        let mut mechanical = false;
        let mut runnable = true;

        for attr in e.attributes() {
            let attr = attr.map_err(|err| err.to_string())?;
            let value = attr
                .unescape_value()
                .map_err(|err| err.to_string())?
                .into_owned();
            match attr.key.as_ref() {
                b"name" => name = Some(value),
                b"cloneof" => cloneof = Some(value),
                b"romof" => romof = Some(value),
                b"isbios" => is_bios = value == "yes",
                b"isdevice" => is_device = value == "yes",
                b"ismechanical" => mechanical = value == "yes",
                b"runnable" => runnable = value != "no",
                _ => {}
            }
        }

        let name = name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| "entry without a name".to_string())?;

        let mut machine = Machine::new(name).with_romset(&self.system, &self.romset);
        machine.is_bios = is_bios;
        machine.is_device = is_device;
        machine.mechanical = mechanical;
        machine.runnable = runnable;
        machine.parent_name = cloneof;
        // Clones point romof at their parent; anything else is a BIOS.
        machine.bios_name = romof.filter(|r| machine.parent_name.as_ref() != Some(r));
        Ok(machine)
    }
}

impl<R: BufRead> Iterator for DatReader<R> {
    type Item = Result<Machine, CatalogError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(machine)) => Some(Ok(machine)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                if !e.is_recoverable() {
                    self.done = true;
                }
                Some(Err(e))
            }
        }
    }
}

fn is_record_tag(e: &BytesStart<'_>) -> bool {
    is_record_tag_name(e.name().as_ref())
}

fn is_record_tag_name(name: &[u8]) -> bool {
    matches!(name, b"game" | b"machine")
}

fn finish(record: Record) -> Result<Machine, CatalogError> {
    record.result.map_err(CatalogError::invalid_record)
}

/// Read one attribute value, unescaped.
fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, String> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| err.to_string())?;
        if attr.key.as_ref() == key {
            let value = attr.unescape_value().map_err(|err| err.to_string())?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn apply_child(record: &mut Record, e: &BytesStart<'_>) {
    let Ok(machine) = &mut record.result else {
        return;
    };
    if let Err(message) = read_child(machine, e) {
        let name = machine.name.clone();
        record.result = Err(format!("{name}: {message}"));
    }
}

fn read_child(machine: &mut Machine, e: &BytesStart<'_>) -> Result<(), String> {
    match e.name().as_ref() {
        b"device_ref" => {
            if let Some(device) = attribute(e, b"name")? {
                machine.device_names.insert(device);
            }
        }
        b"input" => {
            if let Some(players) = attribute(e, b"players")? {
                machine.players = players.parse().ok();
            }
        }
        b"control" => {
            if let Some(control) = attribute(e, b"type")? {
                machine.controls.insert(control);
            }
        }
        b"driver" => {
            machine.emulator_rating = match attribute(e, b"status")?.as_deref() {
                Some("good") => Some(2),
                Some("imperfect") => Some(1),
                Some("preliminary") => Some(0),
                _ => machine.emulator_rating,
            };
        }
        _ => {}
    }
    Ok(())
}

fn apply_text(record: &mut Record, field: TextField, text: String) {
    let Ok(machine) = &mut record.result else {
        return;
    };
    match field {
        TextField::Description => machine.description = Some(text),
        // MAME uses years like "198?"; those stay unset.
        TextField::Year => machine.year = text.parse().ok(),
        TextField::Manufacturer => {
            machine.developers.insert(text);
        }
    }
}

#[cfg(test)]
#[path = "tests/dat_tests.rs"]
mod tests;
