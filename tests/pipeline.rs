//! End-to-end pipeline tests over in-memory sources and a recording mock
//! backend.

use glslforge::error::CompileError;
use glslforge::pipeline::{
    GraphicsBackend, PreDefinitionStore, ProgramHandle, RenderContext, ShaderManager,
    ShaderSources, StageHandle,
};
use glslforge::reflect::{types, InterfaceReflection, LegacyReflection, RawUniform};
use glslforge::{ShaderId, ShaderStage};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct BackendState {
    next_handle: u64,
    compiled: Vec<(ShaderStage, String)>,
    linked: u32,
    freed_programs: Vec<ProgramHandle>,
    fail_compile_containing: Option<String>,
    fail_link: bool,
    reflection: InterfaceReflection,
}

impl BackendState {
    fn compiles_containing(&self, marker: &str) -> usize {
        self.compiled
            .iter()
            .filter(|(_, source)| source.contains(marker))
            .count()
    }
}

#[derive(Clone, Default)]
struct MockBackend {
    state: Arc<Mutex<BackendState>>,
}

impl GraphicsBackend for MockBackend {
    fn compile_stage(
        &mut self,
        stage: ShaderStage,
        source: &str,
    ) -> Result<StageHandle, CompileError> {
        let mut state = self.state.lock();
        let fail = state
            .fail_compile_containing
            .as_deref()
            .map_or(false, |pattern| source.contains(pattern));
        if fail {
            return Err(CompileError::Stage {
                stage,
                log: "mock compile failure".to_string(),
            });
        }
        state.compiled.push((stage, source.to_string()));
        state.next_handle += 1;
        Ok(StageHandle(state.next_handle))
    }

    fn link(&mut self, _stages: &[StageHandle]) -> Result<ProgramHandle, CompileError> {
        let mut state = self.state.lock();
        if state.fail_link {
            return Err(CompileError::Link {
                log: "mock link failure".to_string(),
            });
        }
        state.linked += 1;
        state.next_handle += 1;
        Ok(ProgramHandle(state.next_handle))
    }

    fn free_stage(&mut self, _stage: StageHandle) {}

    fn free_program(&mut self, program: ProgramHandle) {
        self.state.lock().freed_programs.push(program);
    }

    fn query_interface(&mut self, _program: ProgramHandle) -> InterfaceReflection {
        self.state.lock().reflection.clone()
    }

    fn query_legacy(&mut self, _program: ProgramHandle) -> LegacyReflection {
        LegacyReflection::default()
    }
}

#[derive(Default)]
struct MemSources {
    definitions: HashMap<ShaderId, String>,
    sources: HashMap<ShaderId, String>,
    includes: HashMap<String, String>,
}

impl MemSources {
    fn definition(mut self, id: &str, document: &str) -> Self {
        self.definitions.insert(id.into(), document.to_string());
        self
    }

    fn source(mut self, id: &str, text: &str) -> Self {
        self.sources.insert(id.into(), text.to_string());
        self
    }

    fn include(mut self, id: &str, text: &str) -> Self {
        self.includes.insert(id.to_string(), text.to_string());
        self
    }
}

impl ShaderSources for MemSources {
    fn definition_ids(&self) -> Vec<ShaderId> {
        let mut ids: Vec<ShaderId> = self.definitions.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn load_definition(&self, id: &ShaderId) -> Option<String> {
        self.definitions.get(id).cloned()
    }

    fn load_source(&self, id: &ShaderId) -> Option<String> {
        self.sources.get(id).cloned()
    }

    fn resolve_include(&self, id: &str) -> Option<String> {
        self.includes.get(id).cloned()
    }
}

fn harness(
    sources: MemSources,
) -> (
    ShaderManager<MemSources>,
    RenderContext<MockBackend>,
    Arc<Mutex<BackendState>>,
) {
    let _ = env_logger::builder().is_test(true).try_init();
    let backend = MockBackend::default();
    let state = Arc::clone(&backend.state);
    let manager = ShaderManager::new(sources, Arc::new(PreDefinitionStore::new()));
    (manager, RenderContext::new(backend), state)
}

const PLAIN_FRAG: &str = "#version 330 core\nuniform vec4 p1_color;\nvoid main() {\n}\n";

#[test]
fn compiles_and_registers_a_program() {
    let sources = MemSources::default()
        .definition("app:p1", r#"{"fragment": "app:p1.fsh"}"#)
        .source("app:p1.fsh", PLAIN_FRAG);
    let (mut manager, mut ctx, state) = harness(sources);

    manager.mark_dirty(&"app:p1".into());
    manager.tick(&mut ctx);

    assert!(manager.is_live(&"app:p1".into()));
    let state = state.lock();
    assert_eq!(state.compiles_containing("p1_color"), 1);
    assert_eq!(state.linked, 1);
    assert!(state.compiled[0].1.contains("#version 330 core"));
}

#[test]
fn seeds_declared_definitions_and_tracks_dependencies() {
    let sources = MemSources::default()
        .definition(
            "app:p1",
            r#"{"fragment": "app:p1.fsh", "definitions": ["TINT"]}"#,
        )
        .source(
            "app:p1.fsh",
            "#version 330 core\n#ifdef TINT\nuniform vec4 tint;\n#endif\nuniform vec4 p1_color;\nvoid main() {\n}\n",
        )
        .definition("app:p2", r#"{"fragment": "app:p2.fsh"}"#)
        .source(
            "app:p2.fsh",
            "#version 330 core\nuniform vec4 p2_color;\nvoid main() {\n}\n",
        );
    let (mut manager, mut ctx, state) = harness(sources);

    manager.mark_dirty(&"app:p1".into());
    manager.mark_dirty(&"app:p2".into());
    manager.tick(&mut ctx);
    assert!(!state.lock().compiled.last().unwrap().1.contains("tint"));

    // P1 consulted TINT, P2 did not: the change recompiles exactly P1
    manager.predefinitions().set("TINT", Some("1"));
    manager.tick(&mut ctx);

    let state = state.lock();
    assert_eq!(state.compiles_containing("p1_color"), 2);
    assert_eq!(state.compiles_containing("p2_color"), 1);
    assert_eq!(state.compiles_containing("uniform vec4 tint"), 1);
}

#[test]
fn coalesces_dirty_triggers_into_one_cycle() {
    let sources = MemSources::default()
        .definition("app:p1", r#"{"fragment": "app:p1.fsh"}"#)
        .source("app:p1.fsh", PLAIN_FRAG);
    let (mut manager, mut ctx, state) = harness(sources);

    manager.mark_dirty(&"app:p1".into());
    manager.mark_dirty(&"app:p1".into());
    manager.tick(&mut ctx);

    assert_eq!(state.lock().compiles_containing("p1_color"), 1);
}

#[test]
fn parse_failure_is_isolated_per_definition() {
    let sources = MemSources::default()
        .definition("app:bad", r#"{"fragment": "app:bad.fsh"}"#)
        .source("app:bad.fsh", "#version 330 core\nvoid main( {\n}\n")
        .definition("app:good", r#"{"fragment": "app:good.fsh"}"#)
        .source(
            "app:good.fsh",
            "#version 330 core\nuniform vec4 good_color;\nvoid main() {\n}\n",
        );
    let (mut manager, mut ctx, state) = harness(sources);

    manager.mark_dirty(&"app:bad".into());
    manager.mark_dirty(&"app:good".into());
    manager.tick(&mut ctx);

    assert!(!manager.is_live(&"app:bad".into()));
    assert!(manager.is_live(&"app:good".into()));
    assert_eq!(state.lock().compiles_containing("good_color"), 1);
}

#[test]
fn missing_stage_source_is_isolated() {
    let sources = MemSources::default()
        .definition("app:p1", r#"{"fragment": "app:nowhere.fsh"}"#)
        .definition("app:p2", r#"{"fragment": "app:p2.fsh"}"#)
        .source("app:p2.fsh", PLAIN_FRAG);
    let (mut manager, mut ctx, _state) = harness(sources);

    manager.mark_dirty(&"app:p1".into());
    manager.mark_dirty(&"app:p2".into());
    manager.tick(&mut ctx);

    assert!(!manager.is_live(&"app:p1".into()));
    assert!(manager.is_live(&"app:p2".into()));
}

#[test]
fn modifier_is_applied_to_the_compiled_stage() {
    let sources = MemSources::default()
        .definition("app:p1", r#"{"fragment": "app:p1.fsh"}"#)
        .source("app:p1.fsh", PLAIN_FRAG);
    let (mut manager, mut ctx, state) = harness(sources);

    manager
        .modifiers()
        .register(
            "app:p1.fsh",
            "#inject after_declarations\nuniform float exposure;\n",
        )
        .unwrap();
    manager.mark_dirty(&"app:p1".into());
    manager.tick(&mut ctx);

    let state = state.lock();
    let (_, compiled) = &state.compiled[0];
    assert!(compiled.contains("exposure"), "{compiled}");
    assert!(compiled.contains("p1_color"));
}

#[test]
fn pre_420_binding_becomes_an_override() {
    let sources = MemSources::default()
        .definition("app:p1", r#"{"fragment": "app:p1.fsh"}"#)
        .source(
            "app:p1.fsh",
            "#version 330 core\nlayout(binding = 2) uniform sampler2D tex;\nuniform vec4 p1_color;\nvoid main() {\n}\n",
        )
        .definition("app:p2", r#"{"fragment": "app:p2.fsh"}"#)
        .source(
            "app:p2.fsh",
            "#version 450 core\nlayout(binding = 3) uniform sampler2D lut;\nvoid main() {\n}\n",
        );
    let (mut manager, mut ctx, state) = harness(sources);

    manager.mark_dirty(&"app:p1".into());
    manager.mark_dirty(&"app:p2".into());
    manager.tick(&mut ctx);

    let p1 = manager.program(&"app:p1".into()).unwrap();
    assert_eq!(p1.binding_overrides.get("tex"), Some(&2));
    let state = state.lock();
    let (_, compiled) = &state.compiled[0];
    assert!(!compiled.contains("binding"), "{compiled}");
    assert!(compiled.contains("uniform sampler2D tex;"), "{compiled}");

    // 420+ sources keep the layout id and record nothing
    let p2 = manager.program(&"app:p2".into()).unwrap();
    assert!(p2.binding_overrides.is_empty());
    assert!(state.compiled[1].1.contains("binding"));
}

#[test]
fn synthesizes_a_no_op_fragment_stage() {
    let sources = MemSources::default()
        .definition("app:p1", r#"{"vertex": "app:p1.vsh"}"#)
        .source("app:p1.vsh", "#version 330 core\nvoid main() {\n}\n");
    let (mut manager, mut ctx, state) = harness(sources);

    manager.mark_dirty(&"app:p1".into());
    manager.tick(&mut ctx);

    let state = state.lock();
    let stages: Vec<ShaderStage> = state.compiled.iter().map(|(s, _)| *s).collect();
    assert_eq!(stages, vec![ShaderStage::Vertex, ShaderStage::Fragment]);
    assert!(state.compiled[1].1.contains("void main"));
}

#[test]
fn includes_are_resolved_and_invalidation_targets_them() {
    let sources = MemSources::default()
        .definition("app:p1", r#"{"fragment": "app:p1.fsh"}"#)
        .source(
            "app:p1.fsh",
            "#version 330 core\n#include \"lib/common\"\nuniform vec4 p1_color;\nvoid main() {\n}\n",
        )
        .include("lib/common", "uniform float time;\n")
        .definition("app:p2", r#"{"fragment": "app:p2.fsh"}"#)
        .source(
            "app:p2.fsh",
            "#version 330 core\nuniform vec4 p2_color;\nvoid main() {\n}\n",
        );
    let (mut manager, mut ctx, state) = harness(sources);

    manager.mark_dirty(&"app:p1".into());
    manager.mark_dirty(&"app:p2".into());
    manager.tick(&mut ctx);
    assert_eq!(state.lock().compiles_containing("uniform float time"), 1);

    manager.invalidate_include("lib/common");
    manager.tick(&mut ctx);

    let state = state.lock();
    assert_eq!(state.compiles_containing("p1_color"), 2);
    assert_eq!(state.compiles_containing("p2_color"), 1);
}

#[test]
fn link_failure_retains_previous_program() {
    let sources = MemSources::default()
        .definition("app:p1", r#"{"fragment": "app:p1.fsh"}"#)
        .source("app:p1.fsh", PLAIN_FRAG);
    let (mut manager, mut ctx, state) = harness(sources);

    manager.mark_dirty(&"app:p1".into());
    manager.tick(&mut ctx);
    let old_handle = manager.program(&"app:p1".into()).unwrap().handle;

    state.lock().fail_link = true;
    manager.mark_dirty(&"app:p1".into());
    manager.tick(&mut ctx);

    assert_eq!(manager.program(&"app:p1".into()).unwrap().handle, old_handle);
    assert_eq!(state.lock().linked, 1);
}

#[test]
fn replaced_handle_is_released_one_generation_later() {
    let sources = MemSources::default()
        .definition("app:p1", r#"{"fragment": "app:p1.fsh"}"#)
        .source("app:p1.fsh", PLAIN_FRAG);
    let (mut manager, mut ctx, state) = harness(sources);

    manager.mark_dirty(&"app:p1".into());
    manager.tick(&mut ctx);
    let old_handle = manager.program(&"app:p1".into()).unwrap().handle;

    manager.mark_dirty(&"app:p1".into());
    manager.tick(&mut ctx);
    assert_ne!(manager.program(&"app:p1".into()).unwrap().handle, old_handle);
    assert!(state.lock().freed_programs.is_empty());

    manager.tick(&mut ctx);
    assert!(state.lock().freed_programs.is_empty());
    manager.tick(&mut ctx);
    assert_eq!(state.lock().freed_programs.clone(), vec![old_handle]);
}

#[test]
fn conflicting_re_exports_hit_the_retry_bound() {
    // each program rewrites the shared value the other one seeded, so the
    // batch re-dirties itself every attempt until the manager gives up
    let sources = MemSources::default()
        .definition(
            "app:p1",
            r#"{"fragment": "app:p1.fsh", "definitions": ["V"]}"#,
        )
        .source(
            "app:p1.fsh",
            "#version 330 core\n#ifdef V\n#endif\n#define V 1\nuniform vec4 p1_color;\nvoid main() {\n}\n",
        )
        .definition(
            "app:p2",
            r#"{"fragment": "app:p2.fsh", "definitions": ["V"]}"#,
        )
        .source(
            "app:p2.fsh",
            "#version 330 core\n#ifdef V\n#endif\n#define V 2\nuniform vec4 p2_color;\nvoid main() {\n}\n",
        );
    let (mut manager, mut ctx, state) = harness(sources);

    manager.mark_dirty(&"app:p1".into());
    manager.mark_dirty(&"app:p2".into());
    manager.tick(&mut ctx);

    assert_eq!(state.lock().compiles_containing("p1_color"), 3);
    assert_eq!(state.lock().compiles_containing("p2_color"), 3);

    // the leftover ids were dropped from the dirty set, not retried forever
    manager.tick(&mut ctx);
    assert_eq!(state.lock().compiles_containing("p1_color"), 3);
}

#[test]
fn full_reload_rebuilds_every_definition() {
    let sources = MemSources::default()
        .definition("app:p1", r#"{"fragment": "app:p1.fsh"}"#)
        .source("app:p1.fsh", PLAIN_FRAG)
        .definition("app:p2", r#"{"fragment": "app:p2.fsh"}"#)
        .source(
            "app:p2.fsh",
            "#version 330 core\nuniform vec4 p2_color;\nvoid main() {\n}\n",
        );
    let (mut manager, mut ctx, state) = harness(sources);

    manager.mark_dirty(&"app:p1".into());
    manager.tick(&mut ctx);
    let old_handle = manager.program(&"app:p1".into()).unwrap().handle;

    manager.full_reload(&mut ctx);

    assert!(manager.is_live(&"app:p1".into()));
    assert!(manager.is_live(&"app:p2".into()));
    assert_ne!(manager.program(&"app:p1".into()).unwrap().handle, old_handle);
    assert_eq!(state.lock().compiles_containing("p1_color"), 2);
    assert_eq!(state.lock().compiles_containing("p2_color"), 1);
}

#[test]
fn reflection_is_populated_lazily_from_the_backend() {
    let sources = MemSources::default()
        .definition("app:p1", r#"{"fragment": "app:p1.fsh"}"#)
        .source("app:p1.fsh", PLAIN_FRAG);
    let (mut manager, mut ctx, state) = harness(sources);
    state.lock().reflection = InterfaceReflection {
        uniforms: vec![RawUniform {
            name: "p1_color".to_string(),
            location: 4,
            ty: types::FLOAT_VEC4,
            array_len: 1,
            block_index: -1,
        }],
        ..Default::default()
    };

    manager.mark_dirty(&"app:p1".into());
    manager.tick(&mut ctx);

    let id: ShaderId = "app:p1".into();
    let cache = manager.reflection(&id, &mut ctx).unwrap();
    assert!(cache.has_uniform("p1_color"));
    assert_eq!(cache.uniform("p1_color").unwrap().location, 4);
    assert!(manager.reflection(&id, &mut ctx).is_some());
}

#[test]
fn removed_program_handle_is_retired() {
    let sources = MemSources::default()
        .definition("app:p1", r#"{"fragment": "app:p1.fsh"}"#)
        .source("app:p1.fsh", PLAIN_FRAG);
    let (mut manager, mut ctx, state) = harness(sources);

    manager.mark_dirty(&"app:p1".into());
    manager.tick(&mut ctx);
    let handle = manager.program(&"app:p1".into()).unwrap().handle;

    let id: ShaderId = "app:p1".into();
    manager.remove(&id, &mut ctx);
    assert!(!manager.is_live(&id));

    manager.tick(&mut ctx);
    manager.tick(&mut ctx);
    assert_eq!(state.lock().freed_programs.clone(), vec![handle]);
}
