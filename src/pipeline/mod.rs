//! Program definitions and the incremental compile pipeline.
//!
//! A program's life runs Reading (load the definition document and stage
//! sources), Preprocessing (macro expansion seeded from the pre-definition
//! store), Compiling and Linking (through the [`GraphicsBackend`] boundary)
//! to Live (registered in the [`ShaderManager`]). Reading and preprocessing
//! fan out over worker threads; every backend call stays on the thread that
//! owns the [`RenderContext`].

mod bindings;
mod definition;
mod gpu;
mod manager;
mod predef;
mod scheduler;

pub use bindings::strip_binding_overrides;
pub use definition::{
    BlendEquation, BlendFactor, BlendState, DefinitionDefault, ProgramDefinition,
};
pub use gpu::{GraphicsBackend, ProgramHandle, RenderContext, StageHandle};
pub use manager::{LiveProgram, ShaderManager, MAX_COMPILE_ATTEMPTS};
pub use predef::PreDefinitionStore;
pub use scheduler::run_tasks;

use crate::ShaderId;

/// Provider of definition documents and shader text, typically backed by an
/// asset store. Loads run on worker threads, so implementations must be
/// shareable.
pub trait ShaderSources: Sync {
    /// Ids of every known program definition, for a full reload.
    fn definition_ids(&self) -> Vec<ShaderId>;

    /// The JSON definition document for a program id.
    fn load_definition(&self, id: &ShaderId) -> Option<String>;

    /// The raw text of a stage source.
    fn load_source(&self, id: &ShaderId) -> Option<String>;

    /// Text for an `#include` id referenced from a stage source.
    fn resolve_include(&self, id: &str) -> Option<String>;
}
