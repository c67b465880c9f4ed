//! Key pattern templates, expanded against an entity's attributes to build
//! the physical keys for a single-table design
//!
//! A pattern table ([`IndexMap`]) binds logical key names (`PK`, `SK`,
//! `GSI1PK`, `GSI1SK`, ...) to template strings such as `"USER#{ID}"`.
//! [`expand`] and [`expand_with_single_scalar`] turn a pattern table plus an
//! entity's attributes into the concrete strings that get written under
//! those logical names.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;

/// A table of logical key name to template string, registered once per
/// entity type
///
/// Recognised logical key names are `PK`, `SK`, and, for each named
/// secondary index tag in use, `<Tag>PK`/`<Tag>SK` (e.g. `GSI1PK`/`GSI1SK`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexMap {
    patterns: HashMap<String, String>,
}

impl IndexMap {
    /// Start building an empty pattern table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the template for a logical key name
    ///
    /// Calling this twice for the same logical name replaces the earlier
    /// template; `IndexMap` construction has no uniqueness constraint of its
    /// own; that is enforced once per entity type by
    /// [`crate::registry::register_index_map`].
    #[must_use]
    pub fn with(mut self, logical_key: impl Into<String>, template: impl Into<String>) -> Self {
        self.patterns.insert(logical_key.into(), template.into());
        self
    }

    /// The template registered for a logical key name, if any
    pub fn get(&self, logical_key: &str) -> Option<&str> {
        self.patterns.get(logical_key).map(String::as_str)
    }

    /// Iterate over the logical key names and their templates
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.patterns.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// An error expanding a key pattern table against an entity
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyExpansionError {
    /// The pattern table has no template for the required logical key
    #[error("pattern table has no template for logical key `{0}`")]
    MissingLogicalKey(String),

    /// Both `PK` and `SK` expanded to the empty string
    #[error("expansion of `PK`/`SK` yielded an empty key")]
    EmptyKey,
}

/// Expand every template in `patterns` against `source`, producing the
/// concrete logical-key → string map
///
/// For each `(logical_key, template)` pair, every maximal `{Name}`
/// occurrence in `template` is replaced with the stringified value of the
/// attribute `Name` in `source`: strings are copied raw, numbers use their
/// decimal text form, booleans become `true`/`false`, and null/binary/set
/// attributes (which have no natural scalar rendering) substitute the empty
/// string, the same as an attribute absent from `source` entirely. Text
/// outside `{}` is copied verbatim. Multiple macros in one template, and
/// macros repeated across templates, are independent and order-insensitive.
/// Only top-level attributes are referenced; nested map/list paths are not
/// supported by the macro syntax.
pub fn expand(patterns: &IndexMap, source: &HashMap<String, AttributeValue>) -> HashMap<String, String> {
    patterns
        .patterns
        .iter()
        .map(|(logical_key, template)| {
            (logical_key.clone(), expand_template(template, |name| {
                source.get(name).map(stringify_attribute)
            }))
        })
        .collect()
}

/// Expand every template in `patterns`, substituting the single `scalar`
/// value for every macro occurrence regardless of its name
///
/// Used by point reads that start from a bare identifier rather than a full
/// entity, against patterns like `"USER#{ID}"` where the identifier fills
/// every placeholder.
pub fn expand_with_single_scalar(patterns: &IndexMap, scalar: &str) -> HashMap<String, String> {
    patterns
        .patterns
        .iter()
        .map(|(logical_key, template)| {
            (logical_key.clone(), expand_template(template, |_| Some(scalar.to_owned())))
        })
        .collect()
}

fn stringify_attribute(value: &AttributeValue) -> String {
    match value {
        AttributeValue::S(s) => s.clone(),
        AttributeValue::N(n) => n.clone(),
        AttributeValue::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Replace every maximal `{Name}` occurrence in `template` using `lookup`
///
/// Unknown names (lookup returns `None`) substitute the empty string.
fn expand_template(template: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        rest = &rest[open + 1..];

        match rest.find('}') {
            Some(close) => {
                let name = &rest[..close];
                out.push_str(&lookup(name).unwrap_or_default());
                rest = &rest[close + 1..];
            }
            None => {
                // Unterminated macro: treat the rest as a literal, matching
                // the "static portions survive verbatim" rule for malformed
                // input rather than panicking.
                out.push('{');
                out.push_str(rest);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

/// Validate that an expanded key map satisfies the point-operation
/// invariant: `PK` and `SK` are read independently (each defaulting to the
/// empty string if the map has no entry for it), and at least one of them
/// must be non-empty
///
/// The single-object key shorthand (a pattern table with the same template
/// under `PK` and `SK`) needs no special casing here: expanding that table
/// already produces equal `PK`/`SK` strings, so this function just returns
/// them as the validated pair.
///
/// Returns the validated `(pk, sk)` pair.
pub fn require_primary_key(expanded: &HashMap<String, String>) -> Result<(String, String), KeyExpansionError> {
    let pk = expanded.get("PK").map(String::as_str).unwrap_or_default();
    let sk = expanded.get("SK").map(String::as_str).unwrap_or_default();

    if pk.is_empty() && sk.is_empty() {
        return Err(KeyExpansionError::EmptyKey);
    }

    Ok((pk.to_owned(), sk.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, AttributeValue)]) -> HashMap<String, AttributeValue> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn expand_substitutes_known_attributes() {
        let patterns = IndexMap::new()
            .with("PK", "USER#{UserID}")
            .with("SK", "ORDER#{OrderID}");
        let source = attrs(&[
            ("UserID", AttributeValue::S("u1".into())),
            ("OrderID", AttributeValue::S("a".into())),
        ]);

        let expanded = expand(&patterns, &source);
        assert_eq!(expanded["PK"], "USER#u1");
        assert_eq!(expanded["SK"], "ORDER#a");
    }

    #[test]
    fn expand_unknown_attribute_yields_empty_segment() {
        let patterns = IndexMap::new().with("PK", "USER#{Missing}");
        let expanded = expand(&patterns, &HashMap::new());
        assert_eq!(expanded["PK"], "USER#");
    }

    #[test]
    fn expand_handles_multiple_macros_per_template() {
        let patterns = IndexMap::new().with("SK", "{A}#{B}#{A}");
        let source = attrs(&[
            ("A", AttributeValue::S("x".into())),
            ("B", AttributeValue::S("y".into())),
        ]);
        let expanded = expand(&patterns, &source);
        assert_eq!(expanded["SK"], "x#y#x");
    }

    #[test]
    fn expand_numeric_and_boolean_attributes_stringify() {
        let patterns = IndexMap::new().with("SK", "N{Num}#B{Flag}");
        let source = attrs(&[
            ("Num", AttributeValue::N("42".into())),
            ("Flag", AttributeValue::Bool(true)),
        ]);
        let expanded = expand(&patterns, &source);
        assert_eq!(expanded["SK"], "N42#Btrue");
    }

    #[test]
    fn expand_with_single_scalar_fills_every_macro() {
        let patterns = IndexMap::new().with("PK", "USER#{ID}").with("SK", "USER#{ID}");
        let expanded = expand_with_single_scalar(&patterns, "abc123");
        assert_eq!(expanded["PK"], "USER#abc123");
        assert_eq!(expanded["SK"], "USER#abc123");
    }

    #[test]
    fn expand_is_deterministic() {
        let patterns = IndexMap::new().with("PK", "A#{X}#{Y}");
        let source = attrs(&[
            ("X", AttributeValue::S("1".into())),
            ("Y", AttributeValue::S("2".into())),
        ]);
        let first = expand(&patterns, &source);
        let second = expand(&patterns, &source);
        assert_eq!(first, second);
    }

    #[test]
    fn single_object_key_shorthand_when_pk_equals_sk() {
        let patterns = IndexMap::new().with("PK", "ID#{ID}").with("SK", "ID#{ID}");
        let source = attrs(&[("ID", AttributeValue::S("TTOakville".into()))]);
        let expanded = expand(&patterns, &source);
        assert_eq!(expanded["PK"], expanded["SK"]);

        let (pk, sk) = require_primary_key(&expanded).unwrap();
        assert_eq!(pk, "ID#TTOakville");
        assert_eq!(sk, "ID#TTOakville");
    }

    #[test]
    fn require_primary_key_rejects_fully_empty_expansion() {
        let expanded = HashMap::new();
        assert_eq!(require_primary_key(&expanded), Err(KeyExpansionError::EmptyKey));
    }
}
