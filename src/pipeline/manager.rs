//! The shader manager: registry of live programs and the incremental
//! recompilation loop.

use super::{
    bindings,
    definition::ProgramDefinition,
    gpu::{GraphicsBackend, ProgramHandle, RenderContext},
    predef::PreDefinitionStore,
    scheduler, ShaderSources,
};
use crate::{
    error::{DefinitionError, ShaderError},
    front::{parser, writer},
    modify::{self, ModifierRegistry},
    pp::{PreprocessOutput, Preprocessor},
    reflect::UniformCache,
    FastHashMap, FastHashSet, ShaderId, ShaderStage,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Batches rescheduled within one tick before a still-dirty id is declared
/// permanently failed.
pub const MAX_COMPILE_ATTEMPTS: u32 = 3;

/// Attached when a program declares neither a fragment nor a compute
/// stage, so every platform sees a complete pipeline.
const NO_OP_FRAGMENT: &str = "#version 330 core\nvoid main() {\n}\n";

/// A linked program registered in the manager.
pub struct LiveProgram {
    pub definition: ProgramDefinition,
    pub handle: ProgramHandle,
    /// Pre-definition keys the program's sources consulted.
    pub dependencies: FastHashSet<String>,
    /// Ids of every `#include` its sources resolved.
    pub includes: FastHashSet<String>,
    /// `uniform name -> binding` recorded where a pre-420 source carried a
    /// `layout(binding = N)` id, for the caller to apply after linking.
    pub binding_overrides: FastHashMap<String, u32>,
    reflection: UniformCache,
}

/// Output of the worker-side phases for one definition, ready for the GPU
/// thread to compile and link.
struct Processed {
    definition: ProgramDefinition,
    stages: Vec<(ShaderStage, String)>,
    dependencies: FastHashSet<String>,
    includes: FastHashSet<String>,
    binding_overrides: FastHashMap<String, u32>,
}

pub struct ShaderManager<S: ShaderSources> {
    sources: S,
    predefs: Arc<PreDefinitionStore>,
    modifiers: ModifierRegistry,
    programs: FastHashMap<ShaderId, LiveProgram>,
    dirty: Mutex<FastHashSet<ShaderId>>,
    /// Dynamic pre-definition keys changed since the last drain, fed by the
    /// store's change listener.
    changed_keys: Arc<Mutex<FastHashSet<String>>>,
}

impl<S: ShaderSources> ShaderManager<S> {
    pub fn new(sources: S, predefs: Arc<PreDefinitionStore>) -> Self {
        let changed_keys = Arc::new(Mutex::new(FastHashSet::default()));
        let sink = Arc::clone(&changed_keys);
        predefs.on_change(move |name| {
            sink.lock().insert(name.to_string());
        });
        Self {
            sources,
            predefs,
            modifiers: ModifierRegistry::new(),
            programs: FastHashMap::default(),
            dirty: Mutex::new(FastHashSet::default()),
            changed_keys,
        }
    }

    pub fn modifiers(&self) -> &ModifierRegistry {
        &self.modifiers
    }

    pub fn predefinitions(&self) -> &PreDefinitionStore {
        &self.predefs
    }

    pub fn program(&self, id: &ShaderId) -> Option<&LiveProgram> {
        self.programs.get(id)
    }

    pub fn is_live(&self, id: &ShaderId) -> bool {
        self.programs.contains_key(id)
    }

    /// Schedules a definition for recompilation in the next batch.
    pub fn mark_dirty(&self, id: &ShaderId) {
        self.dirty.lock().insert(id.clone());
    }

    /// Schedules every live program that resolved `include`, e.g. after the
    /// included source was hot-reloaded.
    pub fn invalidate_include(&self, include: &str) {
        let mut dirty = self.dirty.lock();
        for (id, program) in &self.programs {
            if program.includes.contains(include) {
                dirty.insert(id.clone());
            }
        }
    }

    /// Reflection tables for a live program, populated on first access
    /// through whichever query the backend supports. GPU thread only.
    pub fn reflection<B: GraphicsBackend>(
        &mut self,
        id: &ShaderId,
        ctx: &mut RenderContext<B>,
    ) -> Option<&UniformCache> {
        let program = self.programs.get_mut(id)?;
        if !program.reflection.is_populated() {
            if ctx.backend().supports_interface_query() {
                let raw = ctx.backend().query_interface(program.handle);
                program.reflection.populate_interface(&raw);
            } else {
                let raw = ctx.backend().query_legacy(program.handle);
                program.reflection.populate_legacy(&raw);
            }
        }
        Some(&program.reflection)
    }

    /// Drives one processing cycle on the GPU thread: advances the handle
    /// release generation, then drains and recompiles dirty definitions.
    ///
    /// A batch can re-dirty ids (a compile re-exporting a changed macro
    /// value is the usual way); those are rescheduled within the same tick
    /// up to [`MAX_COMPILE_ATTEMPTS`] batches, then dropped from the dirty
    /// set and logged as permanent failures.
    pub fn tick<B: GraphicsBackend>(&mut self, ctx: &mut RenderContext<B>) {
        ctx.begin_generation();
        self.settle(ctx);
    }

    fn settle<B: GraphicsBackend>(&mut self, ctx: &mut RenderContext<B>) {
        for _ in 0..MAX_COMPILE_ATTEMPTS {
            let batch = self.drain_dirty();
            if batch.is_empty() {
                return;
            }
            self.process_batch(batch, ctx);
        }
        let leftover = self.drain_dirty();
        for id in &leftover {
            log::error!(
                "shader {id} still dirty after {MAX_COMPILE_ATTEMPTS} attempts, giving up"
            );
        }
    }

    /// Re-reads every known definition and swaps the registry in one step.
    /// Pending incremental work is settled first so the reload never races
    /// a partial update.
    pub fn full_reload<B: GraphicsBackend>(&mut self, ctx: &mut RenderContext<B>) {
        self.settle(ctx);
        self.dirty.lock().clear();
        self.changed_keys.lock().clear();

        let ids = self.sources.definition_ids();
        let total = ids.len();
        let this = &*self;
        let results = scheduler::run_tasks(ids, |id| {
            let processed = this.process_definition(&id);
            (id, processed)
        });

        let mut next = FastHashMap::default();
        for (id, result) in results {
            match result.and_then(|processed| Self::compile_and_link(processed, ctx)) {
                Ok(live) => {
                    next.insert(id, live);
                }
                Err(err) => log::error!("failed to compile shader {id}: {err}"),
            }
        }
        let old = std::mem::replace(&mut self.programs, next);
        for (_, program) in old {
            ctx.retire_program(program.handle);
        }
        log::info!("reloaded {}/{total} shader programs", self.programs.len());
    }

    /// Drops a definition; its handle is retired, not freed in place.
    pub fn remove<B: GraphicsBackend>(&mut self, id: &ShaderId, ctx: &mut RenderContext<B>) {
        self.dirty.lock().remove(id);
        if let Some(program) = self.programs.remove(id) {
            ctx.retire_program(program.handle);
        }
    }

    /// Folds changed pre-definition keys into the dirty set, then drains it
    /// as the next batch.
    fn drain_dirty(&self) -> Vec<ShaderId> {
        let keys: Vec<String> = self.changed_keys.lock().drain().collect();
        let mut dirty = self.dirty.lock();
        if !keys.is_empty() {
            for (id, program) in &self.programs {
                if keys.iter().any(|key| program.dependencies.contains(key)) {
                    dirty.insert(id.clone());
                }
            }
        }
        let mut batch: Vec<ShaderId> = dirty.drain().collect();
        batch.sort();
        batch
    }

    fn process_batch<B: GraphicsBackend>(
        &mut self,
        batch: Vec<ShaderId>,
        ctx: &mut RenderContext<B>,
    ) {
        let total = batch.len();
        log::debug!("recompiling {total} shader program(s)");
        let this = &*self;
        let results = scheduler::run_tasks(batch, |id| {
            let processed = this.process_definition(&id);
            (id, processed)
        });

        let mut linked = 0usize;
        for (id, result) in results {
            match result.and_then(|processed| Self::compile_and_link(processed, ctx)) {
                Ok(live) => {
                    if let Some(old) = self.programs.insert(id, live) {
                        ctx.retire_program(old.handle);
                    }
                    linked += 1;
                }
                Err(err) => log::error!("failed to compile shader {id}: {err}"),
            }
        }
        if linked < total {
            log::warn!("linked {linked}/{total} shader programs");
        }
    }

    /// Worker-side phases for one definition: read the document, load and
    /// preprocess each stage, parse, modify and post-process the tree.
    ///
    /// Modifier scripts run with no placeholder arguments on this path;
    /// scripts whose bodies carry `$n` placeholders are applied through
    /// [`modify::apply`] directly.
    fn process_definition(&self, id: &ShaderId) -> Result<Processed, ShaderError> {
        let document = self
            .sources
            .load_definition(id)
            .ok_or_else(|| DefinitionError::MissingDefinition { id: id.clone() })?;
        let definition = ProgramDefinition::parse(&document)?;

        let present: Vec<ShaderStage> = definition.stages().iter().map(|(s, _)| *s).collect();
        let scripts = self.modifiers.scripts_for(id, &present);
        let statics = self.predefs.statics();

        let mut dependencies = FastHashSet::default();
        let mut includes = FastHashSet::default();
        let mut binding_overrides = FastHashMap::default();
        let mut stages = Vec::with_capacity(present.len() + 1);
        for (stage, source_id) in definition.stages() {
            let source = self
                .sources
                .load_source(source_id)
                .ok_or_else(|| DefinitionError::MissingSource {
                    id: source_id.clone(),
                })?;

            let mut pp = Preprocessor::new();
            for (name, value) in &statics {
                pp.define(name, value.as_deref().unwrap_or(""));
            }
            for def in &definition.definitions {
                // the macro namespace is upper-case; the store key is not
                let macro_name = def.name.to_ascii_uppercase();
                match self.predefs.get(&def.name) {
                    Some(value) => pp.seed(&def.name, &macro_name, value.as_deref().unwrap_or("")),
                    None => match &def.default {
                        Some(value) => pp.seed(&def.name, &macro_name, value),
                        None => pp.seed_absent(&def.name, &macro_name),
                    },
                }
            }

            let resolver = |include: &str| self.sources.resolve_include(include);
            let PreprocessOutput {
                text,
                dependencies: consulted,
                includes: resolved,
                exported,
            } = pp.with_resolver(&resolver).run(&source, source_id.as_str())?;
            dependencies.extend(consulted);
            includes.extend(resolved);
            // changed macro values go back into the store; the diff there
            // keeps converged values from re-dirtying anything
            for (name, value) in &exported {
                self.predefs.set(name, Some(value));
            }

            let mut tree = parser::parse_tree(&text)?;
            let modified = match scripts.get(&stage) {
                Some(list) if !list.is_empty() => {
                    modify::apply(&mut tree, list, &[])?;
                    true
                }
                _ => false,
            };
            let overrides = bindings::strip_binding_overrides(&mut tree);
            let text = if modified || !overrides.is_empty() {
                writer::write_tree(&tree)
            } else {
                text
            };
            binding_overrides.extend(overrides);
            stages.push((stage, text));
        }

        if !present.contains(&ShaderStage::Fragment) && !present.contains(&ShaderStage::Compute) {
            stages.push((ShaderStage::Fragment, NO_OP_FRAGMENT.to_string()));
        }
        Ok(Processed {
            definition,
            stages,
            dependencies,
            includes,
            binding_overrides,
        })
    }

    /// GPU-thread phases: compile each stage, link, free the stage handles.
    fn compile_and_link<B: GraphicsBackend>(
        processed: Processed,
        ctx: &mut RenderContext<B>,
    ) -> Result<LiveProgram, ShaderError> {
        let mut handles = Vec::with_capacity(processed.stages.len());
        let mut failure = None;
        for (stage, text) in &processed.stages {
            match ctx.backend().compile_stage(*stage, text) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        let result = match failure {
            Some(err) => Err(err),
            None => ctx.backend().link(&handles),
        };
        for handle in handles {
            ctx.backend().free_stage(handle);
        }
        let handle = result?;
        Ok(LiveProgram {
            definition: processed.definition,
            handle,
            dependencies: processed.dependencies,
            includes: processed.includes,
            binding_overrides: processed.binding_overrides,
            reflection: UniformCache::new(),
        })
    }
}
