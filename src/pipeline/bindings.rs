//! `layout(binding = N)` support below GLSL 420.
//!
//! The binding layout id on uniforms and interface blocks requires
//! `#version 420`. For older versions the pipeline strips the id from the
//! parsed tree and records a `name -> N` override instead, which the
//! caller applies through the binding API after linking. Atomic counters
//! keep their binding; it is part of their declaration on every version.

use crate::front::ast::{Declaration, Expr, ExternalDecl, Qualifier, Tree, TypeName};
use crate::FastHashMap;

const BINDING_VERSION: u32 = 420;

/// Removes `binding` layout ids from every top-level uniform and block
/// declaration of a pre-420 tree, returning the recorded overrides. Trees
/// at 420 or newer are left untouched.
pub fn strip_binding_overrides(tree: &mut Tree) -> FastHashMap<String, u32> {
    let mut overrides = FastHashMap::default();
    if tree.version.number >= BINDING_VERSION {
        return overrides;
    }

    for decl in &mut tree.declarations {
        let ExternalDecl::Declaration(decl) = decl else {
            continue;
        };
        match decl {
            Declaration::Variable { ty, declarators } => {
                if matches!(&ty.ty.name, TypeName::Named(name) if name == "atomic_uint") {
                    continue;
                }
                if let Some(binding) = take_binding(&mut ty.qualifiers) {
                    for declarator in declarators.iter() {
                        overrides.insert(declarator.name.clone(), binding);
                    }
                }
            }
            Declaration::Block {
                qualifiers, name, ..
            } => {
                // blocks are bound by interface name, not instance name
                if let Some(binding) = take_binding(qualifiers) {
                    overrides.insert(name.clone(), binding);
                }
            }
            Declaration::Precision { .. } => {}
        }
    }
    overrides
}

/// Removes a constant `binding = N` item from the layout qualifiers,
/// dropping any layout qualifier left empty.
fn take_binding(qualifiers: &mut Vec<Qualifier>) -> Option<u32> {
    let mut binding = None;
    for qualifier in qualifiers.iter_mut() {
        let Qualifier::Layout(items) = qualifier else {
            continue;
        };
        items.retain(|item| {
            if item.name == "binding" {
                if let Some(Expr::IntConstant { value, .. }) = &item.value {
                    binding = Some(*value as u32);
                    return false;
                }
            }
            true
        });
    }
    qualifiers.retain(|qualifier| !matches!(qualifier, Qualifier::Layout(items) if items.is_empty()));
    binding
}

#[cfg(test)]
mod tests {
    use super::strip_binding_overrides;
    use crate::front::{parser, writer};

    fn strip(source: &str) -> (String, Vec<(String, u32)>) {
        let mut tree = parser::parse_tree(source).unwrap();
        let mut overrides: Vec<(String, u32)> =
            strip_binding_overrides(&mut tree).into_iter().collect();
        overrides.sort();
        (writer::write_tree(&tree), overrides)
    }

    #[test]
    fn sampler_binding_stripped_and_recorded() {
        let (out, overrides) = strip(
            "#version 330 core\nlayout(binding = 2) uniform sampler2D tex;\nvoid main() {}\n",
        );
        assert_eq!(overrides, vec![("tex".to_string(), 2)]);
        assert!(!out.contains("binding"), "{out}");
        assert!(out.contains("uniform sampler2D tex;"), "{out}");
    }

    #[test]
    fn modern_versions_untouched() {
        let (out, overrides) = strip(
            "#version 450 core\nlayout(binding = 2) uniform sampler2D tex;\nvoid main() {}\n",
        );
        assert!(overrides.is_empty());
        assert!(out.contains("binding"), "{out}");
    }

    #[test]
    fn other_layout_items_survive() {
        let (out, overrides) = strip(
            "#version 330 core\nlayout(std140, binding = 1) uniform Camera { mat4 view; };\nvoid main() {}\n",
        );
        assert_eq!(overrides, vec![("Camera".to_string(), 1)]);
        assert!(out.contains("layout(std140)"), "{out}");
        assert!(!out.contains("binding"), "{out}");
    }

    #[test]
    fn atomic_counters_keep_their_binding() {
        let (out, overrides) = strip(
            "#version 330 core\nlayout(binding = 0) uniform atomic_uint hits;\nvoid main() {}\n",
        );
        assert!(overrides.is_empty());
        assert!(out.contains("binding = 0"), "{out}");
    }

    #[test]
    fn non_constant_binding_left_alone() {
        let (out, overrides) = strip(
            "#version 330 core\nlayout(binding = SLOT) uniform sampler2D tex;\nvoid main() {}\n",
        );
        assert!(overrides.is_empty());
        assert!(out.contains("binding"), "{out}");
    }
}
