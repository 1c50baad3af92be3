//! The program definition document.
//!
//! A definition is a small JSON file naming the stage sources composing one
//! program, the macro keys it wants seeded from the pre-definition store,
//! sampler texture sources and an optional blend descriptor:
//!
//! ```json
//! {
//!     "vertex": "app:post/outline.vsh",
//!     "fragment": "app:post/outline.fsh",
//!     "definitions": ["RADIUS", {"COLOR_MODE": 1}],
//!     "textures": {"DiffuseSampler": "app:textures/white"},
//!     "blend": {"srcrgb": "SRC_ALPHA", "dstrgb": "ONE_MINUS_SRC_ALPHA"}
//! }
//! ```

use crate::{error::DefinitionError, FastHashMap, ShaderId, ShaderStage};
use serde::{de, Deserialize};
use std::fmt;

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlendEquation {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

/// Fixed-function blend descriptor. Unspecified fields keep the standard
/// opaque defaults.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub struct BlendState {
    #[serde(default)]
    pub func: BlendEquation,
    #[serde(default, rename = "alphafunc")]
    pub alpha_func: BlendEquation,
    #[serde(default = "one", rename = "srcrgb")]
    pub src_rgb: BlendFactor,
    #[serde(default = "zero", rename = "dstrgb")]
    pub dst_rgb: BlendFactor,
    #[serde(default = "one", rename = "srcalpha")]
    pub src_alpha: BlendFactor,
    #[serde(default = "zero", rename = "dstalpha")]
    pub dst_alpha: BlendFactor,
}

fn one() -> BlendFactor {
    BlendFactor::One
}

fn zero() -> BlendFactor {
    BlendFactor::Zero
}

impl Default for BlendState {
    fn default() -> Self {
        Self {
            func: BlendEquation::Add,
            alpha_func: BlendEquation::Add,
            src_rgb: one(),
            dst_rgb: zero(),
            src_alpha: one(),
            dst_alpha: zero(),
        }
    }
}

/// One entry of the `definitions` array: a macro key, optionally with a
/// literal fallback used when the pre-definition store has no value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DefinitionDefault {
    pub name: String,
    pub default: Option<String>,
}

impl<'de> Deserialize<'de> for DefinitionDefault {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        struct Visitor;

        impl<'de> de::Visitor<'de> for Visitor {
            type Value = DefinitionDefault;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a macro name or a single-key {name: default} object")
            }

            fn visit_str<E: de::Error>(self, name: &str) -> Result<Self::Value, E> {
                Ok(DefinitionDefault {
                    name: name.to_string(),
                    default: None,
                })
            }

            fn visit_map<A: de::MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let Some((name, value)) = map.next_entry::<String, serde_json::Value>()? else {
                    return Err(de::Error::custom("definition object is empty"));
                };
                if map.next_key::<String>()?.is_some() {
                    return Err(de::Error::custom(
                        "definition object must have exactly one key",
                    ));
                }
                let default = match value {
                    serde_json::Value::String(text) => text,
                    serde_json::Value::Number(number) => number.to_string(),
                    serde_json::Value::Bool(flag) => flag.to_string(),
                    serde_json::Value::Null => String::new(),
                    _ => return Err(de::Error::custom("definition default must be a scalar")),
                };
                Ok(DefinitionDefault {
                    name,
                    default: Some(default),
                })
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}

/// Parsed program definition. At least one stage source id is required.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProgramDefinition {
    pub vertex: Option<ShaderId>,
    pub tess_control: Option<ShaderId>,
    pub tess_evaluation: Option<ShaderId>,
    pub geometry: Option<ShaderId>,
    pub fragment: Option<ShaderId>,
    pub compute: Option<ShaderId>,
    #[serde(default)]
    pub definitions: Vec<DefinitionDefault>,
    #[serde(default)]
    pub textures: FastHashMap<String, String>,
    #[serde(default)]
    pub blend: Option<BlendState>,
}

impl ProgramDefinition {
    pub fn parse(document: &str) -> Result<Self, DefinitionError> {
        let definition: Self = serde_json::from_str(document)?;
        if definition.stages().is_empty() {
            return Err(DefinitionError::NoStages);
        }
        Ok(definition)
    }

    pub fn stage(&self, stage: ShaderStage) -> Option<&ShaderId> {
        match stage {
            ShaderStage::Vertex => self.vertex.as_ref(),
            ShaderStage::TessControl => self.tess_control.as_ref(),
            ShaderStage::TessEvaluation => self.tess_evaluation.as_ref(),
            ShaderStage::Geometry => self.geometry.as_ref(),
            ShaderStage::Fragment => self.fragment.as_ref(),
            ShaderStage::Compute => self.compute.as_ref(),
        }
    }

    /// Declared stages with their source ids, in pipeline order.
    pub fn stages(&self) -> Vec<(ShaderStage, &ShaderId)> {
        ShaderStage::ALL
            .iter()
            .filter_map(|stage| self.stage(*stage).map(|id| (*stage, id)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{BlendEquation, BlendFactor, DefinitionDefault, ProgramDefinition};
    use crate::{error::DefinitionError, ShaderStage};

    #[test]
    fn full_document() {
        let definition = ProgramDefinition::parse(
            r#"{
                "vertex": "app:fx.vsh",
                "fragment": "app:fx.fsh",
                "definitions": ["RADIUS", {"COLOR_MODE": 1}, {"LABEL": "low"}],
                "textures": {"DiffuseSampler": "app:white"},
                "blend": {"srcrgb": "SRC_ALPHA", "dstrgb": "ONE_MINUS_SRC_ALPHA"}
            }"#,
        )
        .unwrap();

        let stages: Vec<ShaderStage> = definition.stages().iter().map(|(s, _)| *s).collect();
        assert_eq!(stages, vec![ShaderStage::Vertex, ShaderStage::Fragment]);
        assert_eq!(
            definition.definitions,
            vec![
                DefinitionDefault {
                    name: "RADIUS".to_string(),
                    default: None
                },
                DefinitionDefault {
                    name: "COLOR_MODE".to_string(),
                    default: Some("1".to_string())
                },
                DefinitionDefault {
                    name: "LABEL".to_string(),
                    default: Some("low".to_string())
                },
            ]
        );
        assert_eq!(definition.textures["DiffuseSampler"], "app:white");

        let blend = definition.blend.unwrap();
        assert_eq!(blend.func, BlendEquation::Add);
        assert_eq!(blend.src_rgb, BlendFactor::SrcAlpha);
        assert_eq!(blend.dst_rgb, BlendFactor::OneMinusSrcAlpha);
        assert_eq!(blend.src_alpha, BlendFactor::One);
        assert_eq!(blend.dst_alpha, BlendFactor::Zero);
    }

    #[test]
    fn no_stages_rejected() {
        let err = ProgramDefinition::parse(r#"{"definitions": ["A"]}"#).unwrap_err();
        assert!(matches!(err, DefinitionError::NoStages));
    }

    #[test]
    fn malformed_json_rejected() {
        assert!(matches!(
            ProgramDefinition::parse("{"),
            Err(DefinitionError::Parse(_))
        ));
    }

    #[test]
    fn multi_key_definition_object_rejected() {
        assert!(ProgramDefinition::parse(
            r#"{"fragment": "f", "definitions": [{"A": 1, "B": 2}]}"#
        )
        .is_err());
    }

    #[test]
    fn compute_only_is_valid() {
        let definition = ProgramDefinition::parse(r#"{"compute": "app:cull.csh"}"#).unwrap();
        assert_eq!(definition.stages().len(), 1);
        assert!(definition.stage(ShaderStage::Compute).is_some());
    }
}
