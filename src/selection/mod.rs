use std::collections::HashMap;

use anyhow::{Result, anyhow};

use crate::core::{GroupKey, SolutionEntry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolutionGroup {
    pub key: GroupKey,
    pub entries: Vec<SolutionEntry>,
}

impl SolutionGroup {
    /// Looks up an entry by its 1-based local number within this group.
    pub fn entry(&self, local: usize) -> Option<&SolutionEntry> {
        local.checked_sub(1).and_then(|idx| self.entries.get(idx))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Entries clustered by the issue they address, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolutionIndex {
    groups: Vec<SolutionGroup>,
}

impl SolutionIndex {
    pub fn group(entries: Vec<SolutionEntry>) -> Self {
        let mut groups: Vec<SolutionGroup> = Vec::new();
        let mut positions: HashMap<GroupKey, usize> = HashMap::new();
        for entry in entries {
            let key = entry.group_key();
            match positions.get(&key) {
                Some(&pos) => groups[pos].entries.push(entry),
                None => {
                    positions.insert(key.clone(), groups.len());
                    groups.push(SolutionGroup {
                        key,
                        entries: vec![entry],
                    });
                }
            }
        }
        Self { groups }
    }

    pub fn groups(&self) -> &[SolutionGroup] {
        &self.groups
    }

    /// Looks up a group by its 1-based display number.
    pub fn get(&self, number: usize) -> Option<&SolutionGroup> {
        number.checked_sub(1).and_then(|idx| self.groups.get(idx))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn entry_count(&self) -> usize {
        self.groups.iter().map(SolutionGroup::len).sum()
    }

    /// Next free global id, for operator-written entries.
    pub fn next_id(&self) -> usize {
        self.groups
            .iter()
            .flat_map(|g| g.entries.iter().map(|e| e.id))
            .max()
            .unwrap_or(0)
            + 1
    }

    /// The group non-interactive selection applies to: the only group, or the
    /// first one listed when there are several.
    pub fn auto_group(&self) -> Option<&SolutionGroup> {
        self.groups.first()
    }

    /// Picks entry `number` (1-based, local to [`Self::auto_group`]).
    pub fn select_auto(&self, number: i64) -> Result<&SolutionEntry> {
        let group = self
            .auto_group()
            .ok_or_else(|| anyhow!("no solutions available to select"))?;
        let max = group.len();
        usize::try_from(number)
            .ok()
            .and_then(|n| group.entry(n))
            .ok_or_else(|| {
                anyhow!("solution number {number} is out of range (1-{max})")
            })
    }
}

/// One parsed answer at a selection prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Pick(usize),
    Custom,
    Back,
    Quit,
    OutOfRange(i64),
    Invalid,
}

/// Parses a prompt answer against a list of `max` items. `allow_custom` and
/// `allow_back` gate the `c` and `b` commands.
pub fn parse_choice(input: &str, max: usize, allow_custom: bool, allow_back: bool) -> Choice {
    let s = input.trim().to_ascii_lowercase();
    match s.as_str() {
        "q" | "quit" | "exit" => return Choice::Quit,
        "c" | "custom" if allow_custom => return Choice::Custom,
        "b" | "back" if allow_back => return Choice::Back,
        _ => {}
    }
    let Ok(n) = s.parse::<i64>() else {
        return Choice::Invalid;
    };
    match usize::try_from(n) {
        Ok(idx) if (1..=max).contains(&idx) => Choice::Pick(idx),
        _ => Choice::OutOfRange(n),
    }
}
