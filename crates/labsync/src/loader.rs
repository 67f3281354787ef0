//! Lab configuration loader (`jumpstarter-lab.yaml` and the records it globs)

use std::path::{Path, PathBuf};

use labsync_api::{
    ExporterConfigTemplate, ExporterHost, ExporterInstance, JumpstarterInstance, LabResource,
    PhysicalLocation,
};
use labsync_core::LabConfig;
use labsync_template::{VarError, Variables};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info};

/// Default lab configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "jumpstarter-lab.yaml";

/// Contents of the lab configuration file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LabConfigFile {
    #[serde(default)]
    pub sources: Sources,
    /// Variable files, relative to the configuration file
    #[serde(default)]
    pub variables: Vec<String>,
}

/// Glob patterns per record kind, relative to the configuration file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Sources {
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub exporter_hosts: Vec<String>,
    #[serde(default)]
    pub exporters: Vec<String>,
    #[serde(default)]
    pub exporter_templates: Vec<String>,
    #[serde(default)]
    pub jumpstarter_instances: Vec<String>,
}

/// Loader errors
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("error reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error decoding YAML from file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("error evaluating glob pattern '{pattern}' for {kind}: {message}")]
    Glob {
        pattern: String,
        kind: &'static str,
        message: String,
    },

    #[error("file {path} has kind '{found}', expected {expected}")]
    WrongKind {
        path: PathBuf,
        expected: &'static str,
        found: String,
    },

    #[error("object from file {path} for {kind} is missing metadata.name")]
    MissingName { path: PathBuf, kind: &'static str },

    #[error("duplicate {kind} name: '{name}' found in file {path} (originally defined in {original})")]
    Duplicate {
        kind: &'static str,
        name: String,
        path: PathBuf,
        original: PathBuf,
    },

    #[error("error loading variables: {0}")]
    Variables(#[from] VarError),
}

impl LabConfigFile {
    /// Parse the lab configuration file
    ///
    /// # Errors
    /// Returns `LoadError::Read` or `LoadError::Parse`
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let content = read(path)?;
        serde_yaml::from_str(&content).map_err(|source| LoadError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Load the lab configuration file and every record and variable file it names
///
/// # Errors
/// Returns the first `LoadError` encountered; nothing is partially loaded.
pub fn load_lab_config(
    path: &Path,
    vault_password_file: Option<&Path>,
) -> Result<LabConfig, LoadError> {
    let file = LabConfigFile::load(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
    let sources = &file.sources;

    let mut variables = Variables::from_password_file(vault_password_file)?;
    for var_file in &file.variables {
        let var_path = base_dir.join(var_file);
        info!(path = %var_path.display(), "loading variables");
        variables.load_from_file(&var_path)?;
    }

    let mut lab = LabConfig::new(variables);
    load_kind::<PhysicalLocation, _>(base_dir, &sources.locations, &mut lab, |lab, r, p| {
        lab.add_physical_location(r, Some(p));
    })?;
    load_kind::<ExporterHost, _>(base_dir, &sources.exporter_hosts, &mut lab, |lab, r, p| {
        lab.add_exporter_host(r, Some(p));
    })?;
    load_kind::<ExporterInstance, _>(base_dir, &sources.exporters, &mut lab, |lab, r, p| {
        lab.add_exporter_instance(r, Some(p));
    })?;
    load_kind::<ExporterConfigTemplate, _>(
        base_dir,
        &sources.exporter_templates,
        &mut lab,
        |lab, r, p| lab.add_exporter_config_template(r, Some(p)),
    )?;
    load_kind::<JumpstarterInstance, _>(
        base_dir,
        &sources.jumpstarter_instances,
        &mut lab,
        |lab, r, p| lab.add_jumpstarter_instance(r, Some(p)),
    )?;

    info!(
        hosts = lab.exporter_hosts.len(),
        instances = lab.exporter_instances.len(),
        templates = lab.exporter_config_templates.len(),
        variables = lab.variables.len(),
        "lab configuration loaded"
    );
    Ok(lab)
}

fn read(path: &Path) -> Result<String, LoadError> {
    std::fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn expand_globs(
    base_dir: &Path,
    patterns: &[String],
    kind: &'static str,
) -> Result<Vec<PathBuf>, LoadError> {
    let mut paths = Vec::new();
    for pattern in patterns.iter().filter(|p| !p.is_empty()) {
        let full = base_dir.join(pattern);
        let glob_error = |message: String| LoadError::Glob {
            pattern: pattern.clone(),
            kind,
            message,
        };
        let entries = glob::glob(&full.to_string_lossy()).map_err(|e| glob_error(e.to_string()))?;
        for entry in entries {
            paths.push(entry.map_err(|e| glob_error(e.to_string()))?);
        }
    }
    Ok(paths)
}

fn load_kind<T, F>(
    base_dir: &Path,
    patterns: &[String],
    lab: &mut LabConfig,
    mut insert: F,
) -> Result<(), LoadError>
where
    T: LabResource + DeserializeOwned,
    F: FnMut(&mut LabConfig, T, PathBuf),
{
    for path in expand_globs(base_dir, patterns, T::KIND)? {
        let record: T = serde_yaml::from_str(&read(&path)?).map_err(|source| LoadError::Parse {
            path: path.clone(),
            source,
        })?;

        if record.kind() != T::KIND {
            return Err(LoadError::WrongKind {
                path,
                expected: T::KIND,
                found: record.kind().to_string(),
            });
        }
        let name = record.name();
        if name.is_empty() {
            return Err(LoadError::MissingName {
                path,
                kind: T::KIND,
            });
        }
        if let Some(original) = lab.source_file(T::KIND, name) {
            return Err(LoadError::Duplicate {
                kind: T::KIND,
                name: name.to_string(),
                path,
                original: original.clone(),
            });
        }

        debug!(kind = T::KIND, name, path = %path.display(), "loaded record");
        insert(lab, record, path);
    }
    Ok(())
}
