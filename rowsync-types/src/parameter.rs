//! Named scope parameters and their content hash.
//!
//! A `ParameterSet` identifies a filtered scope. Its hash is computed by
//! sorting parameters by name (ordinal), concatenating `name.value` for each
//! with no separator between entries, and taking base64(SHA-256) of the UTF-8
//! bytes. The hash must stay stable across processes and platforms since the
//! server uses it to tell filtered subscriptions apart.

use crate::{Error, Result};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::ops::{Index, IndexMut};
use std::sync::OnceLock;

/// Scope name used when the caller does not name one.
pub const DEFAULT_SCOPE_NAME: &str = "DefaultScope";

/// Returns base64(SHA-256) of `bytes`.
#[must_use]
pub fn sha256_base64(bytes: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(bytes))
}

/// Hash of [`DEFAULT_SCOPE_NAME`], computed once per process.
pub fn default_scope_hash() -> &'static str {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| sha256_base64(DEFAULT_SCOPE_NAME.as_bytes()))
}

/// How parameter names are compared for uniqueness and lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NameComparison {
    /// Exact byte comparison.
    Ordinal,
    /// Case-insensitive comparison (Unicode lowercase folding).
    #[default]
    IgnoreCase,
}

impl NameComparison {
    /// Returns true if the two names are equal under this comparison.
    #[must_use]
    pub fn eq(self, a: &str, b: &str) -> bool {
        match self {
            Self::Ordinal => a == b,
            Self::IgnoreCase => {
                a.eq_ignore_ascii_case(b) || a.to_lowercase() == b.to_lowercase()
            }
        }
    }
}

/// A single named parameter. Values always travel as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(rename = "pn")]
    pub name: String,
    #[serde(rename = "v")]
    pub value: String,
}

impl Parameter {
    /// Creates a parameter, rendering the value as text.
    pub fn new(name: impl Into<String>, value: impl ToString) -> Self {
        Self {
            name: name.into(),
            value: value.to_string(),
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

/// Ordered collection of uniquely named parameters.
///
/// Decoding applies the same checks as [`push`](Self::push), so a set read
/// off the wire never holds empty or duplicate names.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParameterSet {
    #[serde(rename = "c")]
    items: Vec<Parameter>,
    #[serde(skip)]
    comparison: NameComparison,
}

impl ParameterSet {
    /// Creates an empty set using case-insensitive name comparison.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty set with the given name comparison.
    #[must_use]
    pub fn with_comparison(comparison: NameComparison) -> Self {
        Self {
            items: Vec::new(),
            comparison,
        }
    }

    /// Builds a set from `(name, value)` pairs, failing on the first duplicate.
    pub fn from_pairs<N, V, I>(pairs: I) -> Result<Self>
    where
        N: Into<String>,
        V: ToString,
        I: IntoIterator<Item = (N, V)>,
    {
        let mut set = Self::new();
        for (name, value) in pairs {
            set.add(name, value)?;
        }
        Ok(set)
    }

    /// Returns the name comparison in use.
    #[must_use]
    pub fn comparison(&self) -> NameComparison {
        self.comparison
    }

    /// Appends a parameter built from `name` and `value`.
    pub fn add(&mut self, name: impl Into<String>, value: impl ToString) -> Result<()> {
        self.push(Parameter::new(name, value))
    }

    /// Appends a parameter, rejecting empty or duplicate names.
    pub fn push(&mut self, parameter: Parameter) -> Result<()> {
        self.check_insertable(&parameter.name)?;
        self.items.push(parameter);
        Ok(())
    }

    /// Inserts a parameter at `index`, rejecting empty or duplicate names.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn insert(&mut self, index: usize, parameter: Parameter) -> Result<()> {
        self.check_insertable(&parameter.name)?;
        self.items.insert(index, parameter);
        Ok(())
    }

    fn check_insertable(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::EmptyParameterName);
        }
        if self.contains(name) {
            return Err(Error::DuplicateParameter(name.to_string()));
        }
        Ok(())
    }

    /// Looks up a parameter by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.position(name).map(|i| &self.items[i])
    }

    /// Looks up a parameter by name for mutation.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.position(name).map(|i| &mut self.items[i])
    }

    /// Returns the position of a parameter by name.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        if name.is_empty() {
            return None;
        }
        self.items
            .iter()
            .position(|p| self.comparison.eq(&p.name, name))
    }

    /// Returns true if a parameter with this name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Removes a parameter by name. Returns false if it was not present.
    pub fn remove(&mut self, name: &str) -> bool {
        match self.position(name) {
            Some(i) => {
                self.items.remove(i);
                true
            }
            None => false,
        }
    }

    /// Removes and returns the parameter at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn remove_at(&mut self, index: usize) -> Parameter {
        self.items.remove(index)
    }

    /// Removes every parameter.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.items.iter()
    }

    /// Content hash identifying this filtered scope.
    ///
    /// Recomputed on every call; never cached across mutation.
    #[must_use]
    pub fn hash(&self) -> String {
        let mut sorted: Vec<&Parameter> = self.items.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));

        let flat: String = sorted
            .iter()
            .map(|p| format!("{}.{}", p.name, p.value))
            .collect();

        sha256_base64(flat.as_bytes())
    }
}

impl<'de> Deserialize<'de> for ParameterSet {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Wire {
            c: Vec<Parameter>,
        }

        let wire = Wire::deserialize(deserializer)?;
        let mut set = Self::new();
        for parameter in wire.c {
            set.push(parameter).map_err(de::Error::custom)?;
        }
        Ok(set)
    }
}

impl PartialEq for ParameterSet {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl Eq for ParameterSet {}

impl Index<usize> for ParameterSet {
    type Output = Parameter;

    fn index(&self, index: usize) -> &Parameter {
        &self.items[index]
    }
}

impl IndexMut<usize> for ParameterSet {
    fn index_mut(&mut self, index: usize) -> &mut Parameter {
        &mut self.items[index]
    }
}

impl<'a> IntoIterator for &'a ParameterSet {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.items.len())
    }
}
