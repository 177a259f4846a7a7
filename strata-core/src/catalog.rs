//! Bidirectional mapping between external string identifiers and dense
//! node indices.
//!
//! The catalog is built once, during ingestion of a level's raw
//! similarity stream, and treated as read-only by every downstream
//! component. Ids are assigned in first-seen order and are dense over
//! `0..len`, so they can index per-node arrays directly.

use std::collections::HashMap;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by catalog construction and lookups.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum CatalogError {
    /// A lookup referenced an identifier the catalog never saw.
    #[error("identifier `{identifier}` is not present in the catalog")]
    UnknownIdentifier {
        /// The identifier that failed to resolve.
        identifier: String,
    },
    /// A lookup referenced a node id the catalog never assigned.
    #[error("node id {node} is not present in the catalog")]
    UnknownNode {
        /// The node id that failed to resolve.
        node: usize,
    },
    /// A persisted catalog stream skipped or repeated an id.
    #[error("catalog stream is not dense at id {id}")]
    NonDense {
        /// The id at which density broke.
        id: usize,
    },
    /// A similarity stream produced no positive-weight edges.
    #[error("similarity stream `{path}` holds no positive-weight edges")]
    EmptyStream {
        /// The offending stream's path.
        path: PathBuf,
    },
}

/// The string-to-index bijection for one pipeline level.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IdentifierCatalog {
    index: HashMap<String, usize>,
    names: Vec<String>,
}

impl IdentifierCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id for `name`, assigning the next dense id on first
    /// sight.
    pub fn intern(&mut self, name: &str) -> usize {
        if let Some(&id) = self.index.get(name) {
            return id;
        }
        let id = self.names.len();
        self.index.insert(name.to_owned(), id);
        self.names.push(name.to_owned());
        id
    }

    /// Looks up the id for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Looks up the id for `name`, failing on an unknown identifier.
    ///
    /// # Errors
    /// Returns [`CatalogError::UnknownIdentifier`] when `name` was never
    /// cataloged.
    pub fn require(&self, name: &str) -> Result<usize, CatalogError> {
        self.get(name).ok_or_else(|| CatalogError::UnknownIdentifier {
            identifier: name.to_owned(),
        })
    }

    /// Looks up the identifier for `node`.
    #[must_use]
    pub fn name_of(&self, node: usize) -> Option<&str> {
        self.names.get(node).map(String::as_str)
    }

    /// Looks up the identifier for `node`, failing on an unknown id.
    ///
    /// # Errors
    /// Returns [`CatalogError::UnknownNode`] when `node` was never
    /// assigned.
    pub fn require_name(&self, node: usize) -> Result<&str, CatalogError> {
        self.name_of(node).ok_or(CatalogError::UnknownNode { node })
    }

    /// Number of cataloged identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns whether the catalog holds no identifiers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterates `(id, name)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(id, name)| (id, name.as_str()))
    }

    /// Rebuilds a catalog from persisted `(id, name)` pairs, in any order.
    ///
    /// # Errors
    /// Returns [`CatalogError::NonDense`] when the ids skip or repeat a
    /// value.
    pub fn from_pairs(pairs: Vec<(usize, String)>) -> Result<Self, CatalogError> {
        let len = pairs.len();
        let mut names: Vec<Option<String>> = vec![None; len];
        for (id, name) in pairs {
            let Some(slot) = names.get_mut(id) else {
                return Err(CatalogError::NonDense { id });
            };
            if slot.is_some() {
                return Err(CatalogError::NonDense { id });
            }
            *slot = Some(name);
        }
        // Every slot is filled: len entries, no id out of range, none
        // repeated.
        let names: Vec<String> = names.into_iter().flatten().collect();
        let index = names
            .iter()
            .enumerate()
            .map(|(id, name)| (name.clone(), id))
            .collect();
        Ok(Self { index, names })
    }
}
