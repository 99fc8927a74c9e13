use std::fmt;

use serde::{Deserialize, Serialize};

/// Dense index of a species, assigned in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpeciesId(usize);

impl SpeciesId {
    pub fn new(raw: usize) -> Self {
        Self(raw)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SpeciesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpeciesRegistry {
    names: Vec<String>,
}

impl SpeciesRegistry {
    /// Registers `name`, returning the existing id when already known.
    pub fn register(&mut self, name: &str) -> SpeciesId {
        if let Some(id) = self.id(name) {
            return id;
        }
        self.names.push(name.to_string());
        SpeciesId(self.names.len() - 1)
    }

    pub fn id(&self, name: &str) -> Option<SpeciesId> {
        self.names.iter().position(|n| n == name).map(SpeciesId)
    }

    pub fn name(&self, id: SpeciesId) -> Option<&str> {
        self.names.get(id.0).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = SpeciesId> {
        (0..self.names.len()).map(SpeciesId)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SpeciesId, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, n)| (SpeciesId(i), n.as_str()))
    }
}
