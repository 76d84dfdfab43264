//! Computation descriptors and their `datalad-make:` URL form
//!
//! A [`Descriptor`] fully describes one computation. It is encoded once into
//! a URL base and specialized per output with a `this` component, so every
//! output file carries the whole recipe for regenerating it.

use crate::error::CodecError;
use crate::hash::Fingerprint;
use crate::params::Parameters;
use crate::path::DatasetPath;
use crate::{TEMPLATE_DIR, URL_SCHEME};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const KEY_ROOT_ID: &str = "root_id";
const KEY_REVISION: &str = "default_root_version";
const KEY_METHOD: &str = "method";
const KEY_INPUT: &str = "input";
const KEY_OUTPUT: &str = "output";
const KEY_PARAMS: &str = "params";
const KEY_THIS: &str = "this";

/// A reproducible computation
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Descriptor {
    /// Identifier of the owning dataset
    pub root_id: String,
    /// Revision pinning the state of all inputs
    pub revision: String,
    /// Template name below the methods directory
    pub method: String,
    /// Template parameters
    pub parameters: Parameters,
    /// Files consumed by the computation
    pub inputs: Vec<DatasetPath>,
    /// Files produced by the computation
    pub outputs: Vec<DatasetPath>,
}

impl Descriptor {
    /// Create a descriptor without parameters or files
    #[must_use]
    pub fn new(
        root_id: impl Into<String>,
        revision: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            root_id: root_id.into(),
            revision: revision.into(),
            method: method.into(),
            parameters: Parameters::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// With parameters
    #[inline]
    #[must_use]
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// With input files
    #[inline]
    #[must_use]
    pub fn with_inputs(mut self, inputs: Vec<DatasetPath>) -> Self {
        self.inputs = inputs;
        self
    }

    /// With output files
    #[inline]
    #[must_use]
    pub fn with_outputs(mut self, outputs: Vec<DatasetPath>) -> Self {
        self.outputs = outputs;
        self
    }

    /// Encode into the URL shared by all outputs
    ///
    /// Deterministic: the same descriptor always yields the same string.
    #[must_use]
    pub fn url_base(&self) -> String {
        format!(
            "{URL_SCHEME}:///?{KEY_ROOT_ID}={}&{KEY_REVISION}={}&{KEY_METHOD}={}&{KEY_INPUT}={}&{KEY_OUTPUT}={}&{KEY_PARAMS}={}",
            urlencoding::encode(&self.root_id),
            urlencoding::encode(&self.revision),
            urlencoding::encode(&self.method),
            urlencoding::encode(&json_paths(&self.inputs)),
            urlencoding::encode(&json_paths(&self.outputs)),
            urlencoding::encode(&json_params(&self.parameters)),
        )
    }

    /// URL registered for one particular output
    #[must_use]
    pub fn url_for(&self, output: &DatasetPath) -> String {
        specialize(&self.url_base(), output)
    }

    /// Digest shared by every output URL of this computation
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::compute(self.url_base().as_bytes())
    }

    /// Location of the template below a dataset or workspace root
    #[must_use]
    pub fn template_path(&self, root: &Path) -> PathBuf {
        template_path(root, &self.method)
    }
}

/// Append the `this` component naming the output a URL is registered for
#[must_use]
pub fn specialize(url_base: &str, output: &DatasetPath) -> String {
    format!("{url_base}&{KEY_THIS}={}", urlencoding::encode(&output.as_string()))
}

/// Check that a method names a file directly inside the methods directory
///
/// # Errors
/// Returns `CodecError::InvalidMethod` for empty names, `.`, `..` and names
/// containing a path separator.
pub fn validate_method(method: &str) -> Result<(), CodecError> {
    let separator = method.contains(&['/', '\\', '\0'][..]);
    if method.is_empty() || method == "." || method == ".." || separator {
        return Err(CodecError::InvalidMethod(method.to_string()));
    }
    Ok(())
}

/// Resolve a method name to its template file below `root`
///
/// `method` is expected to pass [`validate_method`].
#[must_use]
pub fn template_path(root: &Path, method: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    for seg in TEMPLATE_DIR.split('/') {
        path.push(seg);
    }
    path.push(method);
    path
}

fn json_paths(paths: &[DatasetPath]) -> String {
    Value::Array(paths.iter().map(|p| Value::String(p.as_string())).collect()).to_string()
}

fn json_params(params: &Parameters) -> String {
    Value::Object(
        params
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect(),
    )
    .to_string()
}

/// A decoded `datalad-make:` URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenanceUrl {
    /// The computation
    pub descriptor: Descriptor,
    /// The output this URL is registered for, if specialized
    pub this: Option<DatasetPath>,
}

impl ProvenanceUrl {
    /// Check whether a string uses the `datalad-make:` scheme
    #[inline]
    #[must_use]
    pub fn matches_scheme(url: &str) -> bool {
        url.strip_prefix(URL_SCHEME)
            .is_some_and(|rest| rest.starts_with(':'))
    }
}

impl FromStr for ProvenanceUrl {
    type Err = CodecError;

    fn from_str(url: &str) -> Result<Self, Self::Err> {
        let query = url
            .strip_prefix(URL_SCHEME)
            .and_then(|rest| rest.strip_prefix(':'))
            .map(|rest| rest.trim_start_matches('/'))
            .and_then(|rest| rest.strip_prefix('?'))
            .ok_or_else(|| CodecError::invalid_url(url, "expected 'datalad-make:///?<query>'"))?;

        let mut fields = QueryFields::default();
        for component in query.split('&').filter(|c| !c.is_empty()) {
            let (key, raw) = component
                .split_once('=')
                .ok_or_else(|| CodecError::invalid_url(url, format!("component '{component}' has no value")))?;
            let value = urlencoding::decode(raw)
                .map_err(|e| CodecError::invalid_url(url, e.to_string()))?
                .into_owned();
            fields.set(url, key, value)?;
        }

        let require = |value: Option<String>, key: &str| {
            value.ok_or_else(|| CodecError::invalid_url(url, format!("missing '{key}'")))
        };

        let inputs: Vec<DatasetPath> = json(url, KEY_INPUT, &require(fields.input, KEY_INPUT)?)?;
        let outputs: Vec<DatasetPath> =
            json(url, KEY_OUTPUT, &require(fields.output, KEY_OUTPUT)?)?;
        let parameters: Parameters = json(url, KEY_PARAMS, &require(fields.params, KEY_PARAMS)?)?;

        let method = require(fields.method, KEY_METHOD)?;
        validate_method(&method).map_err(|e| CodecError::invalid_url(url, e.to_string()))?;

        let this = fields
            .this
            .map(|t| t.parse::<DatasetPath>())
            .transpose()
            .map_err(|e| CodecError::invalid_url(url, format!("'{KEY_THIS}': {e}")))?;
        if let Some(this) = &this {
            if !outputs.contains(this) {
                return Err(CodecError::invalid_url(
                    url,
                    format!("'{this}' is not a declared output"),
                ));
            }
        }

        Ok(Self {
            descriptor: Descriptor {
                root_id: require(fields.root_id, KEY_ROOT_ID)?,
                revision: require(fields.revision, KEY_REVISION)?,
                method,
                parameters,
                inputs,
                outputs,
            },
            this,
        })
    }
}

fn json<T: DeserializeOwned>(url: &str, key: &str, raw: &str) -> Result<T, CodecError> {
    serde_json::from_str(raw).map_err(|e| CodecError::invalid_url(url, format!("'{key}': {e}")))
}

#[derive(Default)]
struct QueryFields {
    root_id: Option<String>,
    revision: Option<String>,
    method: Option<String>,
    input: Option<String>,
    output: Option<String>,
    params: Option<String>,
    this: Option<String>,
}

impl QueryFields {
    fn set(&mut self, url: &str, key: &str, value: String) -> Result<(), CodecError> {
        let slot = match key {
            KEY_ROOT_ID => &mut self.root_id,
            KEY_REVISION => &mut self.revision,
            KEY_METHOD => &mut self.method,
            KEY_INPUT => &mut self.input,
            KEY_OUTPUT => &mut self.output,
            KEY_PARAMS => &mut self.params,
            KEY_THIS => &mut self.this,
            // unknown components are reserved for later extensions
            _ => return Ok(()),
        };
        if slot.is_some() {
            return Err(CodecError::invalid_url(url, format!("'{key}' given more than once")));
        }
        *slot = Some(value);
        Ok(())
    }
}
