//! Routing criteria and affinity scoring.
//!
//! A [`Criterion`] expresses an interest in a token attribute. Scoring is a pure
//! function of the criteria and the advertised attributes of a token.

use regex::Regex;
use std::collections::HashMap;

use crate::error::Result;

/// Interest in one token attribute
#[derive(Debug, Clone)]
pub struct Criterion {
    pub attribute_name: String,
    pub pattern: Regex,
    pub mandatory: bool,
}

impl Criterion {
    /// The pattern must match the whole attribute value
    pub fn new(attribute_name: impl Into<String>, pattern: &str, mandatory: bool) -> Result<Self> {
        Ok(Self {
            attribute_name: attribute_name.into(),
            pattern: Regex::new(&format!("^(?:{pattern})$"))?,
            mandatory,
        })
    }

    pub fn mandatory(attribute_name: impl Into<String>, pattern: &str) -> Result<Self> {
        Self::new(attribute_name, pattern, true)
    }

    pub fn matches(&self, attributes: &HashMap<String, String>) -> bool {
        attributes
            .get(&self.attribute_name)
            .map(|value| self.pattern.is_match(value))
            .unwrap_or(false)
    }
}

impl PartialEq for Criterion {
    fn eq(&self, other: &Self) -> bool {
        self.attribute_name == other.attribute_name
            && self.pattern.as_str() == other.pattern.as_str()
            && self.mandatory == other.mandatory
    }
}

/// Routing criteria keyed by attribute name; later merges override earlier ones
pub type SelectionCriteria = HashMap<String, Criterion>;

/// Affinity of a token for the given criteria.
///
/// Empty criteria score 1 against any token. Each matching criterion adds one
/// point; a mandatory criterion that does not match disqualifies the token (-1).
/// A token is a candidate when the score is positive.
pub fn affinity_score(criteria: &SelectionCriteria, attributes: &HashMap<String, String>) -> i32 {
    if criteria.is_empty() {
        return 1;
    }

    let mut score = 0;
    for criterion in criteria.values() {
        if criterion.matches(attributes) {
            score += 1;
        } else if criterion.mandatory {
            return -1;
        }
    }
    score
}
