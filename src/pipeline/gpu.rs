//! The graphics-backend boundary.
//!
//! All backend calls go through a [`RenderContext`], which is `!Sync` by
//! construction (it is only ever borrowed mutably): whoever owns the
//! context is the GPU thread, and compile, link, free and reflection
//! queries happen there in program order. The context also implements the
//! deferred-release discipline for superseded program handles.

use crate::error::CompileError;
use crate::reflect::{InterfaceReflection, LegacyReflection};
use crate::ShaderStage;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StageHandle(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u64);

/// Driver-facing operations. Implementations wrap a real GL-style API;
/// tests substitute a recording mock.
pub trait GraphicsBackend {
    fn compile_stage(&mut self, stage: ShaderStage, source: &str)
        -> Result<StageHandle, CompileError>;

    fn link(&mut self, stages: &[StageHandle]) -> Result<ProgramHandle, CompileError>;

    fn free_stage(&mut self, stage: StageHandle);

    fn free_program(&mut self, program: ProgramHandle);

    /// Whether the modern program-interface query is available.
    fn supports_interface_query(&self) -> bool {
        true
    }

    fn query_interface(&mut self, program: ProgramHandle) -> InterfaceReflection;

    fn query_legacy(&mut self, program: ProgramHandle) -> LegacyReflection;
}

/// The single GPU-owning execution context: the backend plus a generation
/// counter for deferred handle release.
///
/// A replaced program handle is retired, not freed. It survives the whole
/// generation after the one it was retired in, so draw calls recorded
/// against the old program before the swap can still complete.
pub struct RenderContext<B: GraphicsBackend> {
    backend: B,
    generation: u64,
    retired: Vec<(u64, ProgramHandle)>,
}

impl<B: GraphicsBackend> RenderContext<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            generation: 0,
            retired: Vec::new(),
        }
    }

    pub fn backend(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Advances the generation and frees every handle retired more than one
    /// full generation ago.
    pub fn begin_generation(&mut self) {
        self.generation += 1;
        let generation = self.generation;
        let backend = &mut self.backend;
        self.retired.retain(|(retired_at, handle)| {
            if retired_at + 1 < generation {
                backend.free_program(*handle);
                false
            } else {
                true
            }
        });
    }

    /// Schedules a superseded program handle for release.
    pub fn retire_program(&mut self, handle: ProgramHandle) {
        self.retired.push((self.generation, handle));
    }
}

impl<B: GraphicsBackend> Drop for RenderContext<B> {
    fn drop(&mut self) {
        for (_, handle) in self.retired.drain(..) {
            self.backend.free_program(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{GraphicsBackend, ProgramHandle, RenderContext, StageHandle};
    use crate::error::CompileError;
    use crate::reflect::{InterfaceReflection, LegacyReflection};
    use crate::ShaderStage;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        freed: Arc<Mutex<Vec<ProgramHandle>>>,
    }

    impl GraphicsBackend for Recorder {
        fn compile_stage(
            &mut self,
            _stage: ShaderStage,
            _source: &str,
        ) -> Result<StageHandle, CompileError> {
            Ok(StageHandle(0))
        }

        fn link(&mut self, _stages: &[StageHandle]) -> Result<ProgramHandle, CompileError> {
            Ok(ProgramHandle(0))
        }

        fn free_stage(&mut self, _stage: StageHandle) {}

        fn free_program(&mut self, program: ProgramHandle) {
            self.freed.lock().unwrap().push(program);
        }

        fn query_interface(&mut self, _program: ProgramHandle) -> InterfaceReflection {
            InterfaceReflection::default()
        }

        fn query_legacy(&mut self, _program: ProgramHandle) -> LegacyReflection {
            LegacyReflection::default()
        }
    }

    #[test]
    fn retired_handle_survives_one_generation() {
        let freed = Arc::new(Mutex::new(Vec::new()));
        let mut ctx = RenderContext::new(Recorder {
            freed: Arc::clone(&freed),
        });

        ctx.begin_generation();
        ctx.retire_program(ProgramHandle(7));
        ctx.begin_generation();
        assert!(freed.lock().unwrap().is_empty());
        ctx.begin_generation();
        assert_eq!(*freed.lock().unwrap(), vec![ProgramHandle(7)]);
    }

    #[test]
    fn drop_frees_pending_handles() {
        let freed = Arc::new(Mutex::new(Vec::new()));
        {
            let mut ctx = RenderContext::new(Recorder {
                freed: Arc::clone(&freed),
            });
            ctx.retire_program(ProgramHandle(3));
        }
        assert_eq!(*freed.lock().unwrap(), vec![ProgramHandle(3)]);
    }
}
