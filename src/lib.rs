/*! GLSL shader pipeline.
 *
 *  The crate is split along the life of a shader source:
 *  - [`pp`] runs the C-style preprocessor over raw text;
 *  - [`front`] lexes and parses the result into a typed syntax tree and
 *    regenerates compilable text from it;
 *  - [`modify`] splices registered source modifiers into parsed trees;
 *  - [`pipeline`] reads program definitions, drives incremental
 *    recompilation and owns the graphics-backend boundary;
 *  - [`reflect`] caches uniform and block reflection for linked programs.
 */

pub mod error;
pub mod front;
pub mod modify;
pub mod pipeline;
pub mod pp;
pub mod reflect;

use std::{fmt, hash::BuildHasherDefault, sync::Arc};

/// Fast hash map used internally for all keyed lookups.
pub type FastHashMap<K, V> =
    std::collections::HashMap<K, V, BuildHasherDefault<rustc_hash::FxHasher>>;
/// Fast hash set, companion to [`FastHashMap`].
pub type FastHashSet<K> =
    std::collections::HashSet<K, BuildHasherDefault<rustc_hash::FxHasher>>;

/// Identifier of a shader program definition or stage source,
/// e.g. `app:post/outline`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(Arc<str>);

impl ShaderId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ShaderId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ShaderId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl<'de> serde::Deserialize<'de> for ShaderId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Self::new)
    }
}

/// Programmable pipeline stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    TessControl,
    TessEvaluation,
    Geometry,
    Fragment,
    Compute,
}

impl ShaderStage {
    /// All stages, in pipeline order.
    pub const ALL: [Self; 6] = [
        Self::Vertex,
        Self::TessControl,
        Self::TessEvaluation,
        Self::Geometry,
        Self::Fragment,
        Self::Compute,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::TessControl => "tess_control",
            Self::TessEvaluation => "tess_evaluation",
            Self::Geometry => "geometry",
            Self::Fragment => "fragment",
            Self::Compute => "compute",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
