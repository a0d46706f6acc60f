//! Group assignment: which family each machine belongs to.
//!
//! Resolution order, first applicable wins:
//! 1. an explicit merge for the machine's name or disc title
//! 2. a split rule matching the machine's title and flags
//! 3. the parent's *resolved* group (transitively)
//! 4. the machine's own title
//!
//! Step 4 uses the title without the disc tag so every disc of a playlist
//! shares one group.

use std::collections::HashMap;

use romsift_catalog::GroupTable;
use romsift_core::Machine;

use crate::report::{DependencyKind, Warning};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    Pending,
    InProgress,
    Done,
}

struct Resolver<'a> {
    machines: &'a [Machine],
    table: &'a GroupTable,
    index: HashMap<(&'a str, &'a str), usize>,
    groups: Vec<String>,
    state: Vec<Visit>,
    warnings: Vec<Warning>,
}

impl<'a> Resolver<'a> {
    fn new(machines: &'a [Machine], table: &'a GroupTable) -> Self {
        let index = machines
            .iter()
            .enumerate()
            .map(|(i, m)| ((m.romset.as_str(), m.name.as_str()), i))
            .collect();
        Self {
            machines,
            table,
            index,
            groups: vec![String::new(); machines.len()],
            state: vec![Visit::Pending; machines.len()],
            warnings: Vec::new(),
        }
    }

    fn resolve(&mut self, i: usize) -> String {
        match self.state[i] {
            Visit::Done => return self.groups[i].clone(),
            Visit::InProgress => {
                self.warnings.push(Warning::ParentCycle {
                    machine: self.machines[i].name.clone(),
                });
                return self.machines[i].title.clone();
            }
            Visit::Pending => {}
        }
        self.state[i] = Visit::InProgress;

        let machines = self.machines;
        let machine = &machines[i];
        let group = if let Some(group) = self.table.merged_group(machine) {
            group.to_string()
        } else if let Some(group) = self.table.split_group(machine) {
            group.to_string()
        } else if let Some(parent) = machine.parent_name.as_deref() {
            match self.index.get(&(machine.romset.as_str(), parent)) {
                Some(&p) => self.resolve(p),
                None => {
                    self.warnings.push(Warning::DanglingReference {
                        machine: machine.name.clone(),
                        kind: DependencyKind::Parent,
                        target: parent.to_string(),
                    });
                    machine.title.clone()
                }
            }
        } else {
            machine.title.clone()
        };

        self.state[i] = Visit::Done;
        self.groups[i] = group.clone();
        group
    }
}

/// Set `group_name` on every machine. Parents are looked up by name within
/// the same romset.
///
/// Returns warnings for dangling parents and parent cycles; affected machines
/// fall back to their own title.
pub fn assign_groups(machines: &mut [Machine], table: &GroupTable) -> Vec<Warning> {
    let (groups, warnings) = {
        let mut resolver = Resolver::new(machines, table);
        for i in 0..machines.len() {
            resolver.resolve(i);
        }
        (resolver.groups, resolver.warnings)
    };

    for (machine, group) in machines.iter_mut().zip(groups) {
        machine.group_name = group;
    }
    warnings
}

#[cfg(test)]
#[path = "tests/grouping_tests.rs"]
mod tests;
