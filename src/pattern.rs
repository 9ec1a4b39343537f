//! Route-template compilation, matching, and parameter extraction.
//!
//! Templates are `/`-separated segment lists. A segment starting with `!` is
//! a required capture, a segment starting with `*` is an optional capture,
//! and anything else is a literal:
//!
//! ```text
//! /users/!user_name/*user_action
//! ```
//!
//! matches `/users/andrew/delete` (both captures) and `/users/andrew`
//! (optional capture absent). A template of only `/` is the root pattern and
//! matches the empty path.
//!
//! Matching is start-anchored and consumes the whole path: literals compare
//! exactly, a required capture consumes exactly one non-empty segment, and an
//! optional capture consumes one segment or none. Query strings are stripped
//! by the dispatcher before matching.

use std::collections::BTreeMap;

use serde_json::Value;

/// One compiled template segment.
#[derive(Clone, Debug, Eq, PartialEq)]
enum Segment {
    Literal(String),
    Required(String),
    Optional(String),
}

/// A compiled route template. Built once per route, immutable thereafter.
#[derive(Clone, Debug)]
pub struct PathPattern {
    template: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Compiles a template string. Leading and trailing slashes are ignored.
    pub fn compile(template: &str) -> Self {
        let trimmed = template.trim_matches('/');
        let segments = if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed
                .split('/')
                .map(|part| match part.as_bytes().first() {
                    Some(&b'!') => Segment::Required(part[1..].to_owned()),
                    Some(&b'*') => Segment::Optional(part[1..].to_owned()),
                    _ => Segment::Literal(part.to_owned()),
                })
                .collect()
        };
        Self { template: trimmed.to_owned(), segments }
    }

    /// The normalized template this pattern was compiled from (no
    /// surrounding slashes; empty for the root pattern).
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Tests a query-stripped request path against the pattern.
    pub fn matches(&self, path: &str) -> bool {
        let path = path.trim_matches('/');
        if self.segments.is_empty() {
            return path.is_empty();
        }
        if path.is_empty() {
            // Only a template made entirely of optional captures can match
            // an empty path.
            return self.segments.iter().all(|s| matches!(s, Segment::Optional(_)));
        }
        let parts: Vec<&str> = path.split('/').collect();
        matches_from(&self.segments, &parts)
    }

    /// Extracts named captures by zipping template segments with path
    /// segments positionally.
    ///
    /// A required capture's key is always present — with a `None` value when
    /// the path has no segment at that position. An optional capture's key
    /// is present only when the path segment exists.
    pub fn params(&self, path: &str) -> Params {
        let path = path.split('?').next().unwrap_or_default().trim_matches('/');
        let parts: Vec<&str> = if path.is_empty() {
            Vec::new()
        } else {
            path.split('/').collect()
        };

        let mut params = Params::default();
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(_) => {}
                Segment::Required(name) => {
                    params.insert(name.clone(), parts.get(i).map(|s| (*s).to_owned()));
                }
                Segment::Optional(name) => {
                    if let Some(part) = parts.get(i) {
                        params.insert(name.clone(), Some((*part).to_owned()));
                    }
                }
            }
        }
        params
    }
}

/// Segment-wise walk with backtracking over optional captures.
fn matches_from(segments: &[Segment], parts: &[&str]) -> bool {
    let Some((segment, rest)) = segments.split_first() else {
        return parts.is_empty();
    };
    match segment {
        Segment::Literal(literal) => {
            parts.first() == Some(&literal.as_str()) && matches_from(rest, &parts[1..])
        }
        Segment::Required(_) => {
            parts.first().is_some_and(|p| !p.is_empty()) && matches_from(rest, &parts[1..])
        }
        Segment::Optional(_) => {
            let consumed = parts.first().is_some_and(|p| !p.is_empty())
                && matches_from(rest, &parts[1..]);
            consumed || matches_from(rest, parts)
        }
    }
}

// ── Params ────────────────────────────────────────────────────────────────────

/// Named parameters extracted from a matched path.
///
/// Distinguishes "required capture with no path segment" (key present, value
/// `None`) from "optional capture absent" (key absent). [`Params::get`]
/// flattens both to `Option<&str>`; use [`Params::contains`] to tell them
/// apart.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Params(BTreeMap<String, Option<String>>);

impl Params {
    /// Returns the captured value for `name`, if present and non-null.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|v| v.as_deref())
    }

    /// Whether the key was extracted at all (possibly with a null value).
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// JSON object view, suitable for passing to hooks.
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| {
                    let value = match v {
                        Some(s) => Value::String(s.clone()),
                        None => Value::Null,
                    };
                    (k.clone(), value)
                })
                .collect(),
        )
    }

    fn insert(&mut self, name: String, value: Option<String>) {
        self.0.insert(name, value);
    }
}
