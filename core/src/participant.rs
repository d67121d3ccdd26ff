//! Interns broker names into dense indices.
//!
//! RULE: Per-participant state everywhere is a Vec indexed by
//! ParticipantIdx. Names are only used at the edges (events in,
//! reports out).

use crate::{
    error::{AuditError, AuditResult},
    types::{ParticipantId, ParticipantIdx},
};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct ParticipantRegistry {
    names: Vec<ParticipantId>,
    index: HashMap<ParticipantId, ParticipantIdx>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from names in order. Duplicates keep their first index.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ParticipantId>,
    {
        let mut registry = Self::new();
        for name in names {
            registry.intern(name.into());
        }
        registry
    }

    /// Return the index for `name`, assigning the next one if unseen.
    pub fn intern(&mut self, name: ParticipantId) -> ParticipantIdx {
        if let Some(idx) = self.index.get(&name) {
            return *idx;
        }
        let idx = ParticipantIdx(self.names.len() as u32);
        self.index.insert(name.clone(), idx);
        self.names.push(name);
        idx
    }

    pub fn get(&self, name: &str) -> Option<ParticipantIdx> {
        self.index.get(name).copied()
    }

    /// Like `get`, but an unknown name is an error.
    pub fn resolve(&self, name: &str) -> AuditResult<ParticipantIdx> {
        self.get(name).ok_or_else(|| AuditError::UnknownParticipant {
            participant: name.to_string(),
        })
    }

    pub fn name(&self, idx: ParticipantIdx) -> &str {
        &self.names[idx.as_usize()]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Indices and names in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (ParticipantIdx, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| (ParticipantIdx(i as u32), name.as_str()))
    }
}
