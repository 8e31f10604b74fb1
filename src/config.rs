//! Semantic Vocabulary Configuration
//!
//! Typed replacement for the dict-shaped semantic template: every recognized
//! field is enumerated with its kind and allowed values, and specifications
//! are validated against the vocabulary at submission time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::spec::{SemanticSpec, SemanticValue};

/// How a semantic field constrains its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    /// Exactly one value, chosen from the enumerated vocabulary.
    Class,
    /// One or more values from the enumerated vocabulary.
    Tag,
    /// Free text, unconstrained.
    Description,
}

/// Definition of one recognized semantic field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    /// Allowed values for `Class`/`Tag` fields; empty for `Description`.
    pub values: Vec<String>,
}

impl FieldDef {
    pub fn new(name: &str, kind: FieldKind, values: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind,
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }
}

/// The set of semantic fields a market recognizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticVocabulary {
    fields: BTreeMap<String, FieldDef>,
}

impl SemanticVocabulary {
    pub fn new(fields: Vec<FieldDef>) -> Self {
        let fields = fields.into_iter().map(|f| (f.name.clone(), f)).collect();
        Self { fields }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    /// Validate a semantic specification against this vocabulary.
    ///
    /// Rejects unrecognized fields, kind mismatches, out-of-vocabulary
    /// values, and (via the semantic builder's own invariants) empty tag
    /// sets.
    pub fn validate(&self, spec: &SemanticSpec) -> Result<()> {
        for (name, value) in spec.iter() {
            let def = self.field(name).ok_or_else(|| {
                Error::InvalidSemantic(format!("unrecognized field `{}`", name))
            })?;
            match (def.kind, value) {
                (FieldKind::Class, SemanticValue::Class(v)) => {
                    if !def.values.iter().any(|allowed| allowed == v) {
                        return Err(Error::InvalidSemantic(format!(
                            "`{}` is not an allowed value for field `{}`",
                            v, name
                        )));
                    }
                }
                (FieldKind::Tag, SemanticValue::Tags(tags)) => {
                    if tags.is_empty() {
                        return Err(Error::InvalidSemantic(format!(
                            "tag field `{}` holds no values",
                            name
                        )));
                    }
                    for tag in tags {
                        if !def.values.iter().any(|allowed| allowed == tag) {
                            return Err(Error::InvalidSemantic(format!(
                                "`{}` is not an allowed tag for field `{}`",
                                tag, name
                            )));
                        }
                    }
                }
                (FieldKind::Description, SemanticValue::Description(_)) => {}
                (expected, _) => {
                    return Err(Error::InvalidSemantic(format!(
                        "field `{}` must be of kind {:?}",
                        name, expected
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for SemanticVocabulary {
    /// The stock market template.
    fn default() -> Self {
        Self::new(vec![
            FieldDef::new(
                "Data",
                FieldKind::Class,
                &["Tabular", "Image", "Video", "Text", "Audio"],
            ),
            FieldDef::new(
                "Task",
                FieldKind::Class,
                &[
                    "Classification",
                    "Regression",
                    "Clustering",
                    "Feature Extraction",
                    "Generation",
                    "Segmentation",
                    "Object Detection",
                ],
            ),
            FieldDef::new("Device", FieldKind::Tag, &["CPU", "GPU"]),
            FieldDef::new(
                "Scenario",
                FieldKind::Tag,
                &[
                    "Business",
                    "Financial",
                    "Health",
                    "Politics",
                    "Computer",
                    "Internet",
                    "Traffic",
                    "Nature",
                    "Fashion",
                    "Industry",
                    "Agriculture",
                    "Education",
                    "Entertainment",
                    "Architecture",
                ],
            ),
            FieldDef::new("Description", FieldKind::Description, &[]),
        ])
    }
}
