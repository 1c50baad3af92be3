//! Shader source modifiers.
//!
//! Modifiers are small externally-authored scripts that patch a parsed
//! shader tree at a declared injection point, or replace its body outright.
//! They are registered against a target shader id plus pipeline stage and
//! applied in `(priority, registration order)` ascending.

mod script;

pub use script::{InjectionPoint, ModifierKind, ModifierScript};

use crate::{
    error::ScriptError,
    front::{ast::*, parser, writer},
    FastHashMap, ShaderId, ShaderStage,
};
use parking_lot::RwLock;

/// Stages a modifier file may target, with the conventional file suffix.
const STAGE_SUFFIXES: [(&str, ShaderStage); 3] = [
    (".vsh", ShaderStage::Vertex),
    (".gsh", ShaderStage::Geometry),
    (".fsh", ShaderStage::Fragment),
];

/// The fixed order `out` declarations propagate through.
const PIPELINE_ORDER: [ShaderStage; 3] = [
    ShaderStage::Vertex,
    ShaderStage::Geometry,
    ShaderStage::Fragment,
];

struct Entry {
    script: ModifierScript,
    order: u64,
}

#[derive(Default)]
struct Target {
    entries: Vec<Entry>,
    /// Set once a replace script lands; later registrations for this
    /// target are ignored until the next clear.
    replaced: bool,
}

#[derive(Default)]
struct Inner {
    next_order: u64,
    targets: FastHashMap<(ShaderId, ShaderStage), Target>,
}

/// Registry of parsed modifier scripts, keyed by target shader and stage.
#[derive(Default)]
pub struct ModifierRegistry {
    inner: RwLock<Inner>,
}

impl ModifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a modifier from its file path and text. The path encodes
    /// the target: `post/outline.vsh` targets the vertex stage of
    /// `post/outline`.
    pub fn register(&self, path: &str, text: &str) -> Result<(), ScriptError> {
        let (target, stage) = split_target(path).ok_or_else(|| ScriptError {
            script: path.to_string(),
            message: "expected a .vsh, .gsh or .fsh suffix".to_string(),
        })?;
        let script = ModifierScript::parse(path, text)?;
        let mut inner = self.inner.write();
        let order = inner.next_order;
        inner.next_order += 1;
        let entry = inner.targets.entry((target, stage)).or_default();
        if entry.replaced {
            log::debug!("ignoring modifier {path}: target already replaced");
            return Ok(());
        }
        if matches!(script.kind, ModifierKind::Replace) {
            entry.entries.clear();
            entry.replaced = true;
        }
        entry.entries.push(Entry { script, order });
        Ok(())
    }

    /// Drops every registered modifier, e.g. ahead of a full reload.
    pub fn clear(&self) {
        self.inner.write().targets.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().targets.is_empty()
    }

    /// Resolved scripts per stage for one program, sorted by
    /// `(priority, registration order)`, with `out` declarations from
    /// vertex/geometry scripts propagated as synthetic input modifiers to
    /// the next present stage.
    pub fn scripts_for(
        &self,
        target: &ShaderId,
        present: &[ShaderStage],
    ) -> FastHashMap<ShaderStage, Vec<ModifierScript>> {
        let inner = self.inner.read();
        let mut resolved: FastHashMap<ShaderStage, Vec<(u64, ModifierScript)>> =
            FastHashMap::default();

        for stage in present {
            if let Some(entry) = inner.targets.get(&(target.clone(), *stage)) {
                let scripts = resolved.entry(*stage).or_default();
                for e in &entry.entries {
                    scripts.push((e.order, e.script.clone()));
                }
            }
        }

        // propagate declared outputs down the pipeline
        let mut synthetic: Vec<(ShaderStage, u64, ModifierScript)> = Vec::new();
        for (stage, scripts) in &resolved {
            if !matches!(stage, ShaderStage::Vertex | ShaderStage::Geometry) {
                continue;
            }
            for (order, script) in scripts {
                for output in &script.outputs {
                    if let Some(next) = next_present_stage(*stage, present) {
                        synthetic.push((next, *order, script.input_counterpart(output)));
                    }
                }
            }
        }
        for (stage, order, script) in synthetic {
            resolved.entry(stage).or_default().push((order, script));
        }

        resolved
            .into_iter()
            .map(|(stage, mut scripts)| {
                scripts.sort_by_key(|(order, script)| (script.priority, *order));
                (stage, scripts.into_iter().map(|(_, s)| s).collect())
            })
            .collect()
    }
}

fn split_target(path: &str) -> Option<(ShaderId, ShaderStage)> {
    for (suffix, stage) in STAGE_SUFFIXES {
        if let Some(target) = path.strip_suffix(suffix) {
            return Some((ShaderId::from(target), stage));
        }
    }
    None
}

fn next_present_stage(after: ShaderStage, present: &[ShaderStage]) -> Option<ShaderStage> {
    let at = PIPELINE_ORDER.iter().position(|s| *s == after)?;
    PIPELINE_ORDER[at + 1..]
        .iter()
        .find(|s| present.contains(s))
        .copied()
}

/// Applies scripts to a parsed tree in order. `args` fills `$0..$n`
/// placeholders in script bodies.
pub fn apply(
    tree: &mut Tree,
    scripts: &[ModifierScript],
    args: &[String],
) -> Result<(), ScriptError> {
    for script in scripts {
        let body = script::fill_placeholders(&script.body, args);
        let decls = parser::parse_fragment(&body).map_err(|e| ScriptError {
            script: script.name.clone(),
            message: e.to_string(),
        })?;
        match &script.kind {
            ModifierKind::Replace => tree.declarations = decls,
            ModifierKind::Input => splice(tree, InjectionPoint::BeforeDeclarations, decls),
            ModifierKind::Simple { point } => splice(tree, *point, decls),
        }
    }
    Ok(())
}

/// Parses, modifies and regenerates a stage source in one step.
pub fn apply_to_source(
    source: &str,
    scripts: &[ModifierScript],
    args: &[String],
) -> Result<String, crate::error::ShaderError> {
    let mut tree = parser::parse_tree(source)?;
    apply(&mut tree, scripts, args)?;
    Ok(writer::write_tree(&tree))
}

fn splice(tree: &mut Tree, point: InjectionPoint, decls: Vec<ExternalDecl>) {
    let at = insertion_index(tree, point);
    tree.declarations.splice(at..at, decls);
}

fn insertion_index(tree: &Tree, point: InjectionPoint) -> usize {
    let decls = &tree.declarations;
    let first_function = decls
        .iter()
        .position(|d| matches!(d, ExternalDecl::Function(_)))
        .unwrap_or(decls.len());
    let main_at = decls.iter().position(
        |d| matches!(d, ExternalDecl::Function(f) if f.prototype.name == "main"),
    );
    match point {
        InjectionPoint::BeforeDeclarations => 0,
        InjectionPoint::AfterDeclarations | InjectionPoint::BeforeFunctions => first_function,
        InjectionPoint::BeforeMain => main_at.unwrap_or(decls.len()),
        InjectionPoint::AfterMain => main_at.map_or(decls.len(), |at| at + 1),
        InjectionPoint::AfterFunctions => decls.len(),
    }
}
