//! Call-scoped parameter sets

use std::collections::BTreeMap;

/// Named set of string parameters
///
/// Used both for `$(param.NAME)` lookups and for bare `$(NAME)` meta lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters {
    name: String,
    values: BTreeMap<String, String>,
}

impl Parameters {
    /// Create an empty parameter set
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: BTreeMap::new(),
        }
    }

    /// Name of this parameter set (used in diagnostics)
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set a single parameter
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Builder-style [`Parameters::set`]
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Copy every entry of `map` into this set, overriding existing keys
    pub fn set_from_map<'a, I>(&mut self, map: I)
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (key, value) in map {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Look up a parameter
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Iterate over all entries
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of parameters
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no parameters are set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
