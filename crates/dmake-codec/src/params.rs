//! Named computation parameters

use crate::error::CodecError;
use std::collections::BTreeMap;

/// Parameter mapping passed to a template
///
/// Names are unique. Iteration is in name order, which keeps encoded URLs
/// and script argument lists deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Parameters(BTreeMap<String, String>);

impl Parameters {
    /// Empty mapping
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `name=value` assignments, splitting each on its first `=`
    ///
    /// # Errors
    /// - `CodecError::InvalidParameter` if an assignment has no `=` or an empty name
    /// - `CodecError::DuplicateParameter` if a name repeats with a different value
    pub fn parse_assignments<I, S>(assignments: I) -> Result<Self, CodecError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut params = Self::new();
        for assignment in assignments {
            let assignment = assignment.as_ref();
            let (name, value) = assignment
                .split_once('=')
                .filter(|(name, _)| !name.is_empty())
                .ok_or_else(|| CodecError::InvalidParameter(assignment.to_string()))?;
            params.try_insert(name, value)?;
        }
        Ok(params)
    }

    /// Insert a parameter, rejecting conflicting redefinitions
    ///
    /// # Errors
    /// Returns `CodecError::DuplicateParameter` if `name` is bound to another value
    pub fn try_insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), CodecError> {
        let name = name.into();
        let value = value.into();
        match self.0.get(&name) {
            Some(existing) if *existing != value => Err(CodecError::DuplicateParameter(name)),
            _ => {
                self.0.insert(name, value);
                Ok(())
            }
        }
    }

    /// Look up a parameter value
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Check whether a parameter is bound
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Iterate `(name, value)` pairs in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of parameters
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are no parameters
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the underlying map
    #[inline]
    #[must_use]
    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}

impl From<BTreeMap<String, String>> for Parameters {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Parameters {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_on_first_equals() {
        let params = Parameters::parse_assignments(["expr=a=b", "n=1"]).unwrap();
        assert_eq!(params.get("expr"), Some("a=b"));
        assert_eq!(params.get("n"), Some("1"));
    }

    #[test]
    fn parse_keeps_empty_value_and_spaces() {
        let params = Parameters::parse_assignments(["label=", "msg=hello world; rm -rf"]).unwrap();
        assert_eq!(params.get("label"), Some(""));
        assert_eq!(params.get("msg"), Some("hello world; rm -rf"));
    }

    #[test]
    fn parse_rejects_missing_equals_or_name() {
        assert!(matches!(
            Parameters::parse_assignments(["novalue"]),
            Err(CodecError::InvalidParameter(_))
        ));
        assert!(matches!(
            Parameters::parse_assignments(["=value"]),
            Err(CodecError::InvalidParameter(_))
        ));
    }

    #[test]
    fn conflicting_duplicates_rejected() {
        assert!(Parameters::parse_assignments(["a=1", "a=1"]).is_ok());
        assert!(matches!(
            Parameters::parse_assignments(["a=1", "a=2"]),
            Err(CodecError::DuplicateParameter(name)) if name == "a"
        ));
    }

    #[test]
    fn iteration_is_name_ordered() {
        let params: Parameters = [("zeta", "1"), ("alpha", "2")].into_iter().collect();
        let names: Vec<_> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
