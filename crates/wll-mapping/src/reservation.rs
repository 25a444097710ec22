//! Output field reservation
//!
//! All mappers of a chain are allocated in one ordered pass over a shared
//! set of claimed names. A mapper asks for:
//! - slots: one candidate pool per semantic field; the lowest index whose
//!   candidates are all still free wins for every slot at once
//! - fixed targets: exact names that must not be taken yet
//! - shared targets: exact names taken only if still free, skipped otherwise

use crate::ConfigError;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default)]
pub struct TargetRequest {
    slots: Vec<(&'static str, &'static [&'static str])>,
    fixed: Vec<(&'static str, String)>,
    shared: Vec<(&'static str, &'static str)>,
}

impl TargetRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(mut self, role: &'static str, candidates: &'static [&'static str]) -> Self {
        self.slots.push((role, candidates));
        self
    }

    pub fn fixed(mut self, role: &'static str, target: impl Into<String>) -> Self {
        self.fixed.push((role, target.into()));
        self
    }

    pub fn shared(mut self, role: &'static str, target: &'static str) -> Self {
        self.shared.push((role, target));
        self
    }
}

/// Role -> output field, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSet {
    entries: Vec<(&'static str, String)>,
}

impl TargetSet {
    /// First field assigned to `role`
    pub fn get(&self, role: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, field)| field.as_str())
    }

    /// All fields assigned to `role`
    pub fn all<'a>(&'a self, role: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(r, _)| *r == role)
            .map(|(_, field)| field.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, field)| field.as_str())
    }

    pub fn entries(&self) -> &[(&'static str, String)] {
        &self.entries
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.entries.iter().any(|(_, f)| f == field)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(&mut self, role: &'static str, field: impl Into<String>) {
        self.entries.push((role, field.into()));
    }
}

/// Claimed output names of one allocation pass
#[derive(Debug, Clone, Default)]
pub struct Reservation {
    claimed: BTreeSet<String>,
}

impl Reservation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_claimed(&self, field: &str) -> bool {
        self.claimed.contains(field)
    }

    pub fn claimed(&self) -> &BTreeSet<String> {
        &self.claimed
    }

    /// Reserve the targets of one mapper; nothing is claimed on error
    pub fn allocate(
        &mut self,
        mapping: &str,
        request: &TargetRequest,
    ) -> Result<TargetSet, ConfigError> {
        let mut targets = TargetSet::default();

        if !request.slots.is_empty() {
            let depth = request
                .slots
                .iter()
                .map(|(_, candidates)| candidates.len())
                .min()
                .unwrap_or(0);

            let index = (0..depth)
                .find(|&i| {
                    request
                        .slots
                        .iter()
                        .all(|(_, candidates)| !self.is_claimed(candidates[i]))
                })
                .ok_or_else(|| ConfigError::TargetsExhausted(mapping.to_string()))?;

            for (role, candidates) in &request.slots {
                targets.push(*role, candidates[index]);
            }
        }

        for (role, target) in &request.fixed {
            if self.is_claimed(target) || targets.contains_field(target) {
                return Err(ConfigError::TargetConflict {
                    mapping: mapping.to_string(),
                    target: target.clone(),
                });
            }
            targets.push(*role, target.clone());
        }

        for (role, target) in &request.shared {
            if !self.is_claimed(target) && !targets.contains_field(target) {
                targets.push(*role, *target);
            }
        }

        self.claimed.extend(targets.fields().map(str::to_string));
        Ok(targets)
    }
}
