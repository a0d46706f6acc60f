use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use serde_json::{Map, Value};

use romsift_core::Machine;
use romsift_lib::{CancelFlag, Selected};

use crate::cli_types::SystemArgs;
use crate::commands::{finish, open_session};
use crate::error::CliError;

/// One JSON object for a machine. Empty attributes are left out.
pub(crate) fn machine_record(
    machine: &Machine,
    dependency: bool,
) -> Result<Map<String, Value>, CliError> {
    let mut fields = match serde_json::to_value(machine)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    fields.retain(|_, value| match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        _ => true,
    });
    if let Some(group) = fields.remove("group_name") {
        fields.insert("group".to_string(), group);
    }
    fields.insert("dependency".to_string(), Value::Bool(dependency));
    Ok(fields)
}

fn record(selected: &Selected) -> Result<Value, CliError> {
    let mut fields = machine_record(&selected.machine, selected.dependency)?;
    fields.insert(
        "target".to_string(),
        Value::String(selected.target.display().to_string()),
    );
    if let Some(source) = &selected.source {
        fields.insert("source".to_string(), Value::String(source.clone()));
    }
    Ok(Value::Object(fields))
}

pub(crate) fn run_list(config: Option<PathBuf>, systems: SystemArgs) -> Result<(), CliError> {
    let session = open_session(config, &systems)?;
    let selection = session.select(&CancelFlag::new())?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for (_, selected) in selection.machines() {
        serde_json::to_writer(&mut out, &record(selected)?)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;

    finish(&selection.report)
}
