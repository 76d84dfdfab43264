//! Per-key compute records
//!
//! A record is spread over several URLs registered for one storage key, one
//! URL per category:
//!
//! ```text
//! compute://<root_id>/method/<base64url>
//! compute://<root_id>/parameter/<base64url>
//! compute://<root_id>/dependencies/<base64url>
//! ```
//!
//! The decoded `parameter` value is `name=value` pairs joined by `;`, the
//! `dependencies` value is `name:value` pairs joined by `;` or the sentinel
//! `none`.

use crate::descriptor::validate_method;
use crate::error::CodecError;
use crate::params::Parameters;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use std::collections::BTreeMap;
use std::fmt;

/// URL scheme of record URLs
pub const RECORD_SCHEME: &str = "compute";

/// Prefix under which record URLs show up as annex URL keys
pub const LEGACY_RECORD_PREFIX: &str = "URL--compute:";

/// `dependencies` value meaning "no dependencies"
pub const NO_DEPENDENCIES: &str = "none";

const RECORD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// The categories a complete record consists of
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    /// Template name
    Method,
    /// Template arguments
    Parameter,
    /// Named dependencies
    Dependencies,
}

impl Category {
    /// All required categories, in canonical order
    pub const ALL: [Category; 3] = [Self::Method, Self::Parameter, Self::Dependencies];

    /// Path segment naming the category
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Method => "method",
            Self::Parameter => "parameter",
            Self::Dependencies => "dependencies",
        }
    }

    fn from_segment(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == segment)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check whether a URL is a record URL (current or legacy prefix)
#[inline]
#[must_use]
pub fn is_record_url(url: &str) -> bool {
    url.starts_with(LEGACY_RECORD_PREFIX) || url.starts_with(&format!("{RECORD_SCHEME}:"))
}

/// A decoded compute record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Identity shared by all URLs of the record
    pub root_id: String,
    /// Template name
    pub method: String,
    /// Template arguments
    pub parameters: Parameters,
    /// Named dependencies (informational, not materialized)
    pub dependencies: BTreeMap<String, String>,
}

impl Record {
    /// Decode the record carried by the URLs registered for one key
    ///
    /// URLs that are not record URLs, or whose path names no known category,
    /// are ignored.
    ///
    /// # Errors
    /// Returns `CodecError::MalformedRecord` if the URLs name more than one
    /// identity, a category is missing, a category has conflicting values, or
    /// a value violates the record grammar.
    pub fn from_urls<I, S>(urls: I) -> Result<Self, CodecError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut root_id: Option<String> = None;
        let mut values: BTreeMap<Category, String> = BTreeMap::new();

        for url in urls {
            let url = url.as_ref();
            let Some(part) = parse_record_url(url)? else {
                continue;
            };

            match &root_id {
                Some(id) if *id != part.root_id => {
                    return Err(CodecError::malformed(format!(
                        "expected a single identity, got '{id}' and '{}'",
                        part.root_id
                    )));
                }
                Some(_) => {}
                None => root_id = Some(part.root_id.clone()),
            }

            if let Some(category) = part.category {
                match values.get(&category) {
                    Some(existing) if *existing != part.value => {
                        return Err(CodecError::malformed(format!(
                            "conflicting values for '{category}'"
                        )));
                    }
                    _ => {
                        values.insert(category, part.value);
                    }
                }
            }
        }

        let missing: Vec<&str> = Category::ALL
            .iter()
            .filter(|c| !values.contains_key(*c))
            .map(|c| c.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(CodecError::malformed(format!(
                "expected 'method', 'parameter' and 'dependencies', missing {}",
                missing.join(", ")
            )));
        }

        let root_id = root_id.ok_or_else(|| CodecError::malformed("no record urls"))?;
        let method = values.remove(&Category::Method).unwrap_or_default();
        validate_method(&method).map_err(|e| CodecError::malformed(e.to_string()))?;

        Ok(Self {
            root_id,
            method,
            parameters: parse_parameters(&values.remove(&Category::Parameter).unwrap_or_default())?,
            dependencies: parse_dependencies(
                &values.remove(&Category::Dependencies).unwrap_or_default(),
            )?,
        })
    }

    /// Encode into one URL per category
    ///
    /// # Errors
    /// - `CodecError::InvalidMethod` if the method is not a plain file name
    /// - `CodecError::Unencodable` if a name or value contains a delimiter of
    ///   the record grammar or ends with a newline
    pub fn to_urls(&self) -> Result<Vec<String>, CodecError> {
        validate_method(&self.method)?;
        reject_reserved("method", &self.method, &[])?;
        let mut parameter = Vec::with_capacity(self.parameters.len());
        for (name, value) in self.parameters.iter() {
            reject_reserved("parameter name", name, &['=', ';'])?;
            reject_reserved("parameter value", value, &[';'])?;
            parameter.push(format!("{name}={value}"));
        }

        let dependencies = if self.dependencies.is_empty() {
            NO_DEPENDENCIES.to_string()
        } else {
            let mut pairs = Vec::with_capacity(self.dependencies.len());
            for (name, value) in &self.dependencies {
                reject_reserved("dependency name", name, &[':', ';'])?;
                reject_reserved("dependency value", value, &[';'])?;
                pairs.push(format!("{name}:{value}"));
            }
            pairs.join(";")
        };

        Ok([
            (Category::Method, self.method.clone()),
            (Category::Parameter, parameter.join(";")),
            (Category::Dependencies, dependencies),
        ]
        .into_iter()
        .map(|(category, value)| {
            format!(
                "{RECORD_SCHEME}://{}/{category}/{}",
                self.root_id,
                RECORD_ENGINE.encode(value.as_bytes())
            )
        })
        .collect())
    }
}

fn reject_reserved(field: &'static str, value: &str, reserved: &[char]) -> Result<(), CodecError> {
    if value.contains(reserved) || value.ends_with('\n') {
        return Err(CodecError::Unencodable {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

struct RecordPart {
    root_id: String,
    category: Option<Category>,
    value: String,
}

/// Split `compute://<id>/<category>/<b64>[/...]` into its parts
fn parse_record_url(url: &str) -> Result<Option<RecordPart>, CodecError> {
    let rest = url.strip_prefix("URL--").unwrap_or(url);
    let Some(rest) = rest
        .strip_prefix(RECORD_SCHEME)
        .and_then(|r| r.strip_prefix(':'))
    else {
        return Ok(None);
    };
    let rest = rest.strip_prefix("//").unwrap_or(rest);

    let (root_id, path) = rest.split_once('/').unwrap_or((rest, ""));
    let mut segments = path.split('/');
    let category = segments.next().and_then(Category::from_segment);
    let value = match (category, segments.next()) {
        (Some(category), Some(encoded)) => {
            let bytes = RECORD_ENGINE.decode(encoded.trim()).map_err(|e| {
                CodecError::malformed(format!("'{category}' segment is not base64: {e}"))
            })?;
            let mut value = String::from_utf8(bytes)
                .map_err(|_| CodecError::malformed(format!("'{category}' is not valid UTF-8")))?;
            // writers may terminate the payload with a newline
            if value.ends_with('\n') {
                value.pop();
            }
            value
        }
        (Some(category), None) => {
            return Err(CodecError::malformed(format!("'{category}' url carries no value")));
        }
        (None, _) => String::new(),
    };

    Ok(Some(RecordPart {
        root_id: root_id.to_string(),
        category,
        value,
    }))
}

/// `name=value;name=value`, split on the first `=` of each pair
fn parse_parameters(raw: &str) -> Result<Parameters, CodecError> {
    let mut params = Parameters::new();
    for pair in raw.split(';').filter(|p| !p.is_empty()) {
        let (name, value) = pair
            .split_once('=')
            .filter(|(name, _)| !name.is_empty())
            .ok_or_else(|| CodecError::malformed(format!("parameter '{pair}' lacks '='")))?;
        params
            .try_insert(name, value)
            .map_err(|_| CodecError::malformed(format!("parameter '{name}' given twice")))?;
    }
    Ok(params)
}

/// `name:value;name:value`, or the `none` sentinel
fn parse_dependencies(raw: &str) -> Result<BTreeMap<String, String>, CodecError> {
    if raw == NO_DEPENDENCIES {
        return Ok(BTreeMap::new());
    }
    raw.split(';')
        .filter(|d| !d.is_empty())
        .map(|spec| {
            spec.split_once(':')
                .filter(|(name, _)| !name.is_empty())
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .ok_or_else(|| CodecError::malformed(format!("dependency '{spec}' lacks ':'")))
        })
        .collect()
}
