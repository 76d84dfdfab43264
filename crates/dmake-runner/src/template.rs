//! Computation templates
//!
//! A template is either a recipe (`*.toml`) describing a command line with
//! `{name}` placeholders, or a script that receives every parameter as a
//! discrete `name=value` argument.

use crate::error::RunnerError;
use dmake_codec::Parameters;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Extension marking a recipe template
pub const RECIPE_EXTENSION: &str = "toml";

/// Recipe file contents
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Recipe {
    /// Program to run, may contain placeholders
    pub executable: String,
    /// Argument formats, one process argument each
    #[serde(default)]
    pub arguments: Vec<String>,
    /// Extra environment variables, values may contain placeholders
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

/// A loaded template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Template {
    /// Command line described by a recipe file
    Recipe {
        /// Location of the recipe file
        path: PathBuf,
        /// Parsed recipe
        recipe: Recipe,
    },
    /// Script invoked with `name=value` arguments
    Script {
        /// Location of the script
        path: PathBuf,
        /// Whether the script can be executed directly
        executable: bool,
    },
}

/// Fully resolved process invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program path or name
    pub program: String,
    /// Discrete process arguments
    pub arguments: Vec<String>,
    /// Extra environment variables
    pub environment: BTreeMap<String, String>,
}

impl Template {
    /// Load the template at `path`
    ///
    /// # Errors
    /// - `RunnerError::TemplateNotFound` if nothing exists at `path`
    /// - `RunnerError::Io` if the recipe cannot be read
    /// - `RunnerError::InvalidRecipe` if the recipe does not parse
    pub fn load(path: &Path) -> Result<Self, RunnerError> {
        if !path.is_file() {
            return Err(RunnerError::TemplateNotFound(path.to_path_buf()));
        }

        if path.extension().is_some_and(|ext| ext == RECIPE_EXTENSION) {
            let raw = std::fs::read_to_string(path).map_err(|e| RunnerError::io_error(path, e))?;
            let recipe: Recipe = toml::from_str(&raw).map_err(|e| RunnerError::InvalidRecipe {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            if recipe.executable.trim().is_empty() {
                return Err(RunnerError::InvalidRecipe {
                    path: path.to_path_buf(),
                    message: "empty executable".to_string(),
                });
            }
            return Ok(Self::Recipe {
                path: path.to_path_buf(),
                recipe,
            });
        }

        let metadata = std::fs::metadata(path).map_err(|e| RunnerError::io_error(path, e))?;
        Ok(Self::Script {
            path: path.to_path_buf(),
            executable: is_executable(&metadata),
        })
    }

    /// Path the template was loaded from
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Recipe { path, .. } | Self::Script { path, .. } => path,
        }
    }

    /// Resolve the process invocation for a parameter mapping
    ///
    /// Relative recipe executables containing a `/` are resolved against the
    /// recipe's directory.
    ///
    /// # Errors
    /// Returns `RunnerError::UnresolvedPlaceholder` or
    /// `RunnerError::MalformedFormat` if a recipe format cannot be filled.
    pub fn invocation(&self, params: &Parameters) -> Result<Invocation, RunnerError> {
        match self {
            Self::Recipe { path, recipe } => {
                let mut program = substitute(&recipe.executable, params)?;
                if program.contains('/') && Path::new(&program).is_relative() {
                    if let Some(dir) = path.parent() {
                        program = dir.join(&program).to_string_lossy().into_owned();
                    }
                }
                let arguments = recipe
                    .arguments
                    .iter()
                    .map(|format| substitute(format, params))
                    .collect::<Result<Vec<_>, _>>()?;
                let environment = recipe
                    .environment
                    .iter()
                    .map(|(name, format)| Ok((name.clone(), substitute(format, params)?)))
                    .collect::<Result<BTreeMap<_, _>, RunnerError>>()?;
                Ok(Invocation {
                    program,
                    arguments,
                    environment,
                })
            }
            Self::Script { path, executable } => {
                let script = path.to_string_lossy().into_owned();
                let assignments = params.iter().map(|(name, value)| format!("{name}={value}"));
                let (program, arguments) = if *executable {
                    (script, assignments.collect())
                } else {
                    ("sh".to_string(), std::iter::once(script).chain(assignments).collect())
                };
                Ok(Invocation {
                    program,
                    arguments,
                    environment: BTreeMap::new(),
                })
            }
        }
    }
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    false
}

/// Fill `{name}` placeholders in `format` from `params`
///
/// `{{` and `}}` produce literal braces.
///
/// # Errors
/// - `RunnerError::UnresolvedPlaceholder` if a placeholder names no parameter
/// - `RunnerError::MalformedFormat` on an unbalanced brace
pub fn substitute(format: &str, params: &Parameters) -> Result<String, RunnerError> {
    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') | None => {
                            return Err(RunnerError::MalformedFormat(format.to_string()))
                        }
                        Some(c) => name.push(c),
                    }
                }
                let value = params
                    .get(&name)
                    .ok_or_else(|| RunnerError::UnresolvedPlaceholder {
                        name: name.clone(),
                        format: format.to_string(),
                    })?;
                out.push_str(value);
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(RunnerError::MalformedFormat(format.to_string())),
            c => out.push(c),
        }
    }

    Ok(out)
}
