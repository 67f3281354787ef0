//! Placeholder resolution
//!
//! Placeholders look like `$(var.NAME)`, `$(param.NAME)` or `$(NAME)`; the
//! first is looked up in [`Variables`], the second in the call parameters
//! and the bare form in the optional meta parameters.

use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::trace;

use crate::error::TemplateError;
use crate::params::Parameters;
use crate::vars::Variables;

/// Maximum substitution rounds before a circular reference is reported
pub const RECURSION_LIMIT: usize = 10;

static ANY_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\((.*?)\)").expect("placeholder regex is valid"));

static KEY_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\(\s*([^\s()]+)\s*\)").expect("key regex is valid"));

static UNRESOLVED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\(\s*(.*?)\s*\)").expect("unresolved regex is valid"));

/// Whether `data` contains anything that looks like a placeholder
#[must_use]
pub fn needs_replacements(data: &str) -> bool {
    ANY_PLACEHOLDER.is_match(data)
}

/// Resolve every placeholder in `data`
///
/// Strings without placeholders are returned unchanged and never touch the
/// variable store.
///
/// # Errors
/// Returns `TemplateError::Variable` if a store value cannot be read,
/// `TemplateError::CircularReference` if substitution does not settle within
/// [`RECURSION_LIMIT`] rounds, and `TemplateError::Unresolved` if unknown
/// placeholders remain.
pub fn process_template(
    data: &str,
    variables: &Variables,
    parameters: Option<&Parameters>,
    meta: Option<&Parameters>,
) -> Result<String, TemplateError> {
    Resolver::new(variables, parameters, meta).resolve(data)
}

/// Resolution context for a single walk over an object graph
///
/// The replacement map is built on the first string that needs it and
/// reused for the rest of the walk.
pub struct Resolver<'a> {
    variables: &'a Variables,
    parameters: Option<&'a Parameters>,
    meta: Option<&'a Parameters>,
    replacements: OnceCell<BTreeMap<String, String>>,
}

impl<'a> Resolver<'a> {
    /// Create a resolver over a variable store and optional parameter sets
    #[must_use]
    pub fn new(
        variables: &'a Variables,
        parameters: Option<&'a Parameters>,
        meta: Option<&'a Parameters>,
    ) -> Self {
        Self {
            variables,
            parameters,
            meta,
            replacements: OnceCell::new(),
        }
    }

    /// Resolve a single string
    ///
    /// # Errors
    /// See [`process_template`]
    pub fn resolve(&self, data: &str) -> Result<String, TemplateError> {
        if !needs_replacements(data) {
            return Ok(data.to_string());
        }
        apply_replacements(data, self.replacements()?)
    }

    /// Resolve a string in place, leaving it untouched on the fast path
    ///
    /// # Errors
    /// See [`process_template`]
    pub fn resolve_in_place(&self, data: &mut String) -> Result<(), TemplateError> {
        if !needs_replacements(data) {
            return Ok(());
        }
        *data = apply_replacements(data, self.replacements()?)?;
        Ok(())
    }

    fn replacements(&self) -> Result<&BTreeMap<String, String>, TemplateError> {
        if let Some(map) = self.replacements.get() {
            return Ok(map);
        }
        let map = construct_replacement_map(self.variables, self.parameters, self.meta)?;
        Ok(self.replacements.get_or_init(|| map))
    }
}

fn construct_replacement_map(
    variables: &Variables,
    parameters: Option<&Parameters>,
    meta: Option<&Parameters>,
) -> Result<BTreeMap<String, String>, TemplateError> {
    let mut replacements = BTreeMap::new();

    for key in variables.keys() {
        let value = variables
            .get(key)
            .map_err(|source| TemplateError::Variable {
                key: key.to_string(),
                source,
            })?;
        replacements.insert(format!("var.{key}"), value);
    }

    if let Some(parameters) = parameters {
        for (key, value) in parameters.iter() {
            replacements.insert(format!("param.{key}"), value.to_string());
        }
    }

    if let Some(meta) = meta {
        for (key, value) in meta.iter() {
            replacements.insert(key.to_string(), value.to_string());
        }
    }

    Ok(replacements)
}

fn apply_replacements(
    data: &str,
    replacements: &BTreeMap<String, String>,
) -> Result<String, TemplateError> {
    let mut data = data.to_string();
    // last substitution whose value introduced new placeholders
    let mut recursive: Option<(String, String)> = None;

    for round in 0..RECURSION_LIMIT {
        recursive = None;
        data = KEY_PLACEHOLDER
            .replace_all(&data, |caps: &Captures<'_>| {
                let key = &caps[1];
                match replacements.get(key) {
                    Some(value) => {
                        if needs_replacements(value) {
                            recursive = Some((key.to_string(), value.clone()));
                        }
                        value.clone()
                    }
                    None => caps[0].to_string(),
                }
            })
            .into_owned();

        if recursive.is_none() {
            trace!(rounds = round + 1, "template resolved");
            break;
        }
    }

    if let Some((key, value)) = recursive {
        return Err(TemplateError::CircularReference { key, value });
    }

    let mut keys: Vec<String> = Vec::new();
    for caps in UNRESOLVED.captures_iter(&data) {
        let key = caps[1].to_string();
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    if !keys.is_empty() {
        return Err(TemplateError::Unresolved { keys });
    }

    Ok(data)
}
