//! Semantic Specification
//!
//! Declarative tags describing a learnware's domain: single-valued `Class`
//! fields, set-valued `Tag` fields and free-text descriptions. Matching is
//! what the search stage-A filter runs on.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The value held by one semantic field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SemanticValue {
    /// Exactly one value chosen from an enumerated vocabulary.
    Class(String),
    /// One or more values from an enumerated vocabulary. Never empty.
    Tags(BTreeSet<String>),
    /// Free text; imposes no search constraint.
    Description(String),
}

/// Ordered mapping from field name to semantic value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticSpec {
    fields: BTreeMap<String, SemanticValue>,
}

impl SemanticSpec {
    pub fn builder() -> SemanticSpecBuilder {
        SemanticSpecBuilder::default()
    }

    pub fn get(&self, field: &str) -> Option<&SemanticValue> {
        self.fields.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SemanticValue)> {
        self.fields.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether this specification satisfies a user query.
    ///
    /// Every `Class` field present in the query must be matched by an equal
    /// single value; every `Tags` field must have a non-empty intersection
    /// with the query's tag set. Description fields and fields absent from
    /// the query impose no constraint.
    pub fn matches(&self, query: &SemanticSpec) -> bool {
        for (name, want) in query.iter() {
            match want {
                SemanticValue::Class(value) => match self.fields.get(name) {
                    Some(SemanticValue::Class(have)) if have == value => {}
                    _ => return false,
                },
                SemanticValue::Tags(wanted) => match self.fields.get(name) {
                    Some(SemanticValue::Tags(have))
                        if have.intersection(wanted).next().is_some() => {}
                    _ => return false,
                },
                SemanticValue::Description(_) => {}
            }
        }
        true
    }
}

/// Builder enforcing the field-shape invariants at construction.
#[derive(Debug, Default)]
pub struct SemanticSpecBuilder {
    fields: BTreeMap<String, SemanticValue>,
    error: Option<Error>,
}

impl SemanticSpecBuilder {
    pub fn class(mut self, field: &str, value: impl Into<String>) -> Self {
        self.fields
            .insert(field.to_string(), SemanticValue::Class(value.into()));
        self
    }

    pub fn tags<I, S>(mut self, field: &str, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = tags.into_iter().map(Into::into).collect();
        if set.is_empty() {
            self.error = Some(Error::InvalidSemantic(format!(
                "tag field `{}` must hold at least one value",
                field
            )));
        } else {
            self.fields.insert(field.to_string(), SemanticValue::Tags(set));
        }
        self
    }

    pub fn description(mut self, field: &str, text: impl Into<String>) -> Self {
        self.fields
            .insert(field.to_string(), SemanticValue::Description(text.into()));
        self
    }

    pub fn build(self) -> Result<SemanticSpec> {
        if let Some(err) = self.error {
            return Err(err);
        }
        Ok(SemanticSpec { fields: self.fields })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(scenarios: &[&str]) -> SemanticSpec {
        SemanticSpec::builder()
            .class("Data", "Tabular")
            .class("Task", "Classification")
            .tags("Device", ["GPU"])
            .tags("Scenario", scenarios.to_vec())
            .description("Description", "")
            .build()
            .unwrap()
    }

    #[test]
    fn test_class_must_match_exactly() {
        let query = SemanticSpec::builder()
            .class("Data", "Tabular")
            .build()
            .unwrap();
        assert!(candidate(&["Nature"]).matches(&query));

        let query = SemanticSpec::builder()
            .class("Data", "Image")
            .build()
            .unwrap();
        assert!(!candidate(&["Nature"]).matches(&query));
    }

    #[test]
    fn test_tags_match_by_intersection_not_subset() {
        let query = SemanticSpec::builder()
            .tags("Scenario", ["Business", "Nature"])
            .build()
            .unwrap();
        // One shared tag is enough.
        assert!(candidate(&["Nature", "Traffic"]).matches(&query));
        assert!(!candidate(&["Health"]).matches(&query));
    }

    #[test]
    fn test_absent_query_fields_impose_no_constraint() {
        let query = SemanticSpec::default();
        assert!(candidate(&["Nature"]).matches(&query));
    }

    #[test]
    fn test_description_imposes_no_constraint() {
        let query = SemanticSpec::builder()
            .description("Description", "anything at all")
            .build()
            .unwrap();
        assert!(candidate(&["Nature"]).matches(&query));
    }

    #[test]
    fn test_missing_candidate_field_fails_constraint() {
        let query = SemanticSpec::builder()
            .tags("Device", ["CPU"])
            .build()
            .unwrap();
        let bare = SemanticSpec::default();
        assert!(!bare.matches(&query));
    }

    #[test]
    fn test_empty_tag_set_rejected_at_build() {
        let result = SemanticSpec::builder()
            .tags("Scenario", Vec::<String>::new())
            .build();
        assert!(matches!(result, Err(Error::InvalidSemantic(_))));
    }
}
