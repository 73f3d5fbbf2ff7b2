//! Field selectors.
//!
//! A selector is a list of `field=value` terms. A record matches when every
//! term matches exactly. Boolean fields compare against `true`/`false`.

use std::fmt;

use crate::error::{RecordError, RecordResult};

/// A record kind whose fields can be selected on.
pub trait Selectable {
    /// Record kind name.
    const KIND: &'static str;

    /// Field labels this kind supports.
    const FIELDS: &'static [&'static str];

    /// Returns the value of a field label, or `None` if unsupported.
    fn field(&self, label: &str) -> Option<String>;
}

/// Exact-match, AND-combined field selector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelector {
    terms: Vec<(String, String)>,
}

impl FieldSelector {
    /// Creates a selector matching everything.
    #[must_use]
    pub const fn everything() -> Self {
        Self { terms: Vec::new() }
    }

    /// Adds a `field=value` term.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl ToString) -> Self {
        self.terms.push((field.into(), value.to_string()));
        self
    }

    /// Parses `a=b,c=d`. `==` is accepted as `=`.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::InvalidSelector`] for a term without `=` or
    /// with an empty field.
    pub fn parse(input: &str) -> RecordResult<Self> {
        let mut selector = Self::everything();
        for term in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (field, value) = term
                .split_once("==")
                .or_else(|| term.split_once('='))
                .ok_or_else(|| RecordError::InvalidSelector(term.to_string()))?;
            let field = field.trim();
            if field.is_empty() || field.ends_with('!') {
                return Err(RecordError::InvalidSelector(term.to_string()));
            }
            selector = selector.with(field, value.trim());
        }
        Ok(selector)
    }

    /// Returns whether the selector has no terms.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Checks every term against the fields `R` supports.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::UnsupportedField`] for the first unknown label.
    pub fn validate<R: Selectable>(&self) -> RecordResult<()> {
        match self.terms.iter().find(|(f, _)| !R::FIELDS.contains(&f.as_str())) {
            Some((field, _)) => Err(RecordError::UnsupportedField {
                kind: R::KIND,
                field: field.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Returns whether `record` matches every term.
    pub fn matches<R: Selectable>(&self, record: &R) -> bool {
        self.terms
            .iter()
            .all(|(field, value)| record.field(field).is_some_and(|v| v == *value))
    }
}

impl fmt::Display for FieldSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, value)) in self.terms.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{field}={value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Thing {
        cluster: String,
        expired: bool,
    }

    impl Selectable for Thing {
        const KIND: &'static str = "Thing";
        const FIELDS: &'static [&'static str] = &["spec.cluster", "status.expired"];

        fn field(&self, label: &str) -> Option<String> {
            match label {
                "spec.cluster" => Some(self.cluster.clone()),
                "status.expired" => Some(self.expired.to_string()),
                _ => None,
            }
        }
    }

    fn thing(cluster: &str, expired: bool) -> Thing {
        Thing {
            cluster: cluster.to_string(),
            expired,
        }
    }

    #[test]
    fn terms_are_anded() {
        let selector = FieldSelector::everything()
            .with("spec.cluster", "prod")
            .with("status.expired", false);

        assert!(selector.matches(&thing("prod", false)));
        assert!(!selector.matches(&thing("prod", true)));
        assert!(!selector.matches(&thing("staging", false)));
    }

    #[test]
    fn match_is_exact() {
        let selector = FieldSelector::everything().with("spec.cluster", "prod");
        assert!(!selector.matches(&thing("prod-eu", false)));
    }

    #[test]
    fn empty_matches_all() {
        assert!(FieldSelector::everything().matches(&thing("x", true)));
    }

    #[test]
    fn parse_and_display() {
        let selector = FieldSelector::parse("spec.cluster=prod, status.expired==false").unwrap();
        assert_eq!(selector.to_string(), "spec.cluster=prod,status.expired=false");
        assert!(selector.matches(&thing("prod", false)));

        assert!(FieldSelector::parse("spec.cluster").is_err());
        assert!(FieldSelector::parse("spec.cluster!=prod").is_err());
        assert!(FieldSelector::parse("").unwrap().is_empty());
    }

    #[test]
    fn unknown_field_is_rejected() {
        let selector = FieldSelector::everything().with("spec.owner", "alice");
        let err = selector.validate::<Thing>().unwrap_err();
        assert!(matches!(err, RecordError::UnsupportedField { .. }));
    }
}
