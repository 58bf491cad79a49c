//! Typed input controls attached to a story.
//!
//! A control describes one interactively editable prop of the previewed
//! component: its name, its kind, and a default value. Variant controls
//! additionally carry the closed set of allowed values. Controls cross the
//! process boundary as JSON emitted by the export probe, tagged by `kind`,
//! and decode into the [`Control`] enum; anything that fails to decode is
//! discarded at that boundary.
//!
//! Within one story control names are unique. The builder enforces that as
//! a construction-time contract: accumulating a duplicate name fails the
//! final `build()` instead of silently shadowing.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// Control
// ============================================================================

/// One typed input descriptor.
///
/// The `kind` tags mirror the constructor names used by story files, which
/// is what the export probe reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Control {
    #[serde(rename = "ArrayControl")]
    Array { name: String, default: Vec<Value> },

    #[serde(rename = "BooleanControl")]
    Bool { name: String, default: bool },

    #[serde(rename = "NumberControl")]
    Number { name: String, default: f64 },

    #[serde(rename = "StringControl")]
    String { name: String, default: String },

    #[serde(rename = "VariantControl")]
    Variant {
        name: String,
        default: String,
        options: Vec<String>,
    },
}

impl Control {
    pub fn name(&self) -> &str {
        match self {
            Self::Array { name, .. }
            | Self::Bool { name, .. }
            | Self::Number { name, .. }
            | Self::String { name, .. }
            | Self::Variant { name, .. } => name,
        }
    }
}

// ============================================================================
// ControlSet
// ============================================================================

#[derive(Debug, Error, PartialEq, Eq)]
#[error("duplicate control name `{0}`")]
pub struct DuplicateControl(pub String);

/// An immutable, ordered set of controls with unique names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControlSet {
    controls: Vec<Control>,
}

impl ControlSet {
    pub fn builder() -> ControlSetBuilder {
        ControlSetBuilder::default()
    }

    /// Validate a decoded control list into a set.
    ///
    /// # Errors
    /// Fails when two controls share a name.
    pub fn from_controls(controls: Vec<Control>) -> Result<Self, DuplicateControl> {
        let mut builder = Self::builder();
        for control in controls {
            builder = builder.push(control);
        }
        builder.build()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Control> {
        self.controls.iter()
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }
}

/// Fluent accumulator for [`ControlSet`], consumed once by [`build`].
///
/// Accumulation never fails mid-chain; uniqueness is checked when the
/// builder is consumed so the fluent style stays uninterrupted.
///
/// [`build`]: ControlSetBuilder::build
#[derive(Debug, Default)]
pub struct ControlSetBuilder {
    controls: Vec<Control>,
}

impl ControlSetBuilder {
    pub fn array(self, name: impl Into<String>, default: Vec<Value>) -> Self {
        self.push(Control::Array {
            name: name.into(),
            default,
        })
    }

    pub fn bool(self, name: impl Into<String>, default: bool) -> Self {
        self.push(Control::Bool {
            name: name.into(),
            default,
        })
    }

    pub fn number(self, name: impl Into<String>, default: f64) -> Self {
        self.push(Control::Number {
            name: name.into(),
            default,
        })
    }

    pub fn string(self, name: impl Into<String>, default: impl Into<String>) -> Self {
        self.push(Control::String {
            name: name.into(),
            default: default.into(),
        })
    }

    pub fn variant(
        self,
        name: impl Into<String>,
        default: impl Into<String>,
        options: Vec<String>,
    ) -> Self {
        self.push(Control::Variant {
            name: name.into(),
            default: default.into(),
            options,
        })
    }

    fn push(mut self, control: Control) -> Self {
        self.controls.push(control);
        self
    }

    /// Consume the builder, checking name uniqueness.
    ///
    /// # Errors
    /// Fails with the first duplicated name, in accumulation order.
    pub fn build(self) -> Result<ControlSet, DuplicateControl> {
        let mut seen: Vec<&str> = Vec::with_capacity(self.controls.len());
        for control in &self.controls {
            if seen.contains(&control.name()) {
                return Err(DuplicateControl(control.name().to_owned()));
            }
            seen.push(control.name());
        }
        Ok(ControlSet {
            controls: self.controls,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_accumulates_in_order() {
        let set = ControlSet::builder()
            .string("label", "Click me")
            .bool("disabled", false)
            .number("count", 3.0)
            .build()
            .unwrap();

        let names: Vec<_> = set.iter().map(Control::name).collect();
        assert_eq!(names, ["label", "disabled", "count"]);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let err = ControlSet::builder()
            .string("label", "a")
            .bool("label", true)
            .build()
            .unwrap_err();

        assert_eq!(err, DuplicateControl("label".into()));
    }

    #[test]
    fn test_duplicate_across_kinds_rejected() {
        let controls = vec![
            Control::Number {
                name: "size".into(),
                default: 1.0,
            },
            Control::Variant {
                name: "size".into(),
                default: "sm".into(),
                options: vec!["sm".into(), "lg".into()],
            },
        ];
        assert!(ControlSet::from_controls(controls).is_err());
    }

    #[test]
    fn test_decode_tagged_controls() {
        let raw = json!([
            {"kind": "StringControl", "name": "label", "default": "Hi"},
            {"kind": "VariantControl", "name": "size", "default": "sm", "options": ["sm", "lg"]}
        ]);

        let controls: Vec<Control> = serde_json::from_value(raw).unwrap();
        assert_eq!(controls.len(), 2);
        assert!(matches!(&controls[1], Control::Variant { options, .. } if options.len() == 2));
    }

    #[test]
    fn test_unknown_kind_fails_decode() {
        let raw = json!({"kind": "ColorControl", "name": "bg", "default": "#fff"});
        assert!(serde_json::from_value::<Control>(raw).is_err());
    }

    #[test]
    fn test_array_control_holds_arbitrary_values() {
        let set = ControlSet::builder()
            .array("items", vec![json!("a"), json!(2)])
            .build()
            .unwrap();
        assert_eq!(set.len(), 1);
    }
}
