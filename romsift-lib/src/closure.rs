//! Dependency closure over selected machines.

use std::collections::{HashMap, HashSet};

use romsift_core::Machine;

use crate::report::{DependencyKind, Warning};

/// Machines to retain: the selected ones plus everything they need.
#[derive(Debug, Default)]
pub struct Closure<'a> {
    /// Selected machines first, in input order, then dependencies in the
    /// order they were discovered.
    pub machines: Vec<&'a Machine>,
    /// How many of `machines` were added only as dependencies.
    pub dependencies: usize,
    pub warnings: Vec<Warning>,
}

impl<'a> Closure<'a> {
    /// Whether the machine at `index` is in the closure only as a dependency.
    pub fn is_dependency(&self, index: usize) -> bool {
        index >= self.machines.len() - self.dependencies
    }
}

/// Follow parent, BIOS and device references from `selected` until no new
/// machine is added.
///
/// References are looked up by name within the referring machine's romset.
/// A reference to a missing machine is recorded once in `warnings` and
/// otherwise ignored.
pub fn compute_closure<'a>(selected: &[&'a Machine], all: &'a [Machine]) -> Closure<'a> {
    let index: HashMap<(&str, &str), &'a Machine> = all
        .iter()
        .map(|m| ((m.romset.as_str(), m.name.as_str()), m))
        .collect();

    let mut retained: HashSet<(&str, &str)> = HashSet::new();
    let mut closure = Closure::default();
    for &machine in selected {
        if retained.insert((machine.romset.as_str(), machine.name.as_str())) {
            closure.machines.push(machine);
        }
    }

    let mut reported = HashSet::new();
    let mut cursor = 0;
    while cursor < closure.machines.len() {
        let machine = closure.machines[cursor];
        cursor += 1;

        for (kind, target) in references(machine) {
            let key = (machine.romset.as_str(), target);
            let Some(&dependency) = index.get(&key) else {
                if reported.insert((machine.name.as_str(), target)) {
                    closure.warnings.push(Warning::DanglingReference {
                        machine: machine.name.clone(),
                        kind,
                        target: target.to_string(),
                    });
                }
                continue;
            };
            if retained.insert(key) {
                log::debug!("{} keeps {kind} {}", machine.name, dependency.name);
                closure.machines.push(dependency);
                closure.dependencies += 1;
            }
        }
    }

    closure
}

fn references(machine: &Machine) -> impl Iterator<Item = (DependencyKind, &str)> {
    let parent = machine
        .parent_name
        .as_deref()
        .map(|p| (DependencyKind::Parent, p));
    let bios = machine
        .bios_name
        .as_deref()
        .map(|b| (DependencyKind::Bios, b));
    let devices = machine
        .device_names
        .iter()
        .map(|d| (DependencyKind::Device, d.as_str()));
    parent.into_iter().chain(bios).chain(devices)
}
