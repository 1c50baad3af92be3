//! Uniform and block reflection for linked programs.
//!
//! The cache is populated lazily from raw data queried off the graphics
//! backend, through one of two algorithms: the modern program-interface
//! query, which exposes block members with offsets and strides, and the
//! legacy per-uniform iteration for drivers without it. Entries are
//! immutable once computed and cleared only when the program is relinked.

use crate::FastHashMap;

/// GL-ish type tags and the sampler classification set.
pub mod types {
    pub const FLOAT: u32 = 0x1406;
    pub const FLOAT_VEC2: u32 = 0x8B50;
    pub const FLOAT_VEC3: u32 = 0x8B51;
    pub const FLOAT_VEC4: u32 = 0x8B52;
    pub const INT: u32 = 0x1404;
    pub const INT_VEC2: u32 = 0x8B53;
    pub const INT_VEC3: u32 = 0x8B54;
    pub const INT_VEC4: u32 = 0x8B55;
    pub const UNSIGNED_INT: u32 = 0x1405;
    pub const UNSIGNED_INT_VEC2: u32 = 0x8DC6;
    pub const UNSIGNED_INT_VEC3: u32 = 0x8DC7;
    pub const UNSIGNED_INT_VEC4: u32 = 0x8DC8;
    pub const BOOL: u32 = 0x8B56;
    pub const FLOAT_MAT2: u32 = 0x8B5A;
    pub const FLOAT_MAT3: u32 = 0x8B5B;
    pub const FLOAT_MAT4: u32 = 0x8B5C;
    pub const DOUBLE: u32 = 0x140A;

    pub const SAMPLER_1D: u32 = 0x8B5D;
    pub const SAMPLER_2D: u32 = 0x8B5E;
    pub const SAMPLER_3D: u32 = 0x8B5F;
    pub const SAMPLER_CUBE: u32 = 0x8B60;
    pub const SAMPLER_1D_SHADOW: u32 = 0x8B61;
    pub const SAMPLER_2D_SHADOW: u32 = 0x8B62;
    pub const SAMPLER_1D_ARRAY: u32 = 0x8DC0;
    pub const SAMPLER_2D_ARRAY: u32 = 0x8DC1;
    pub const SAMPLER_1D_ARRAY_SHADOW: u32 = 0x8DC3;
    pub const SAMPLER_2D_ARRAY_SHADOW: u32 = 0x8DC4;
    pub const SAMPLER_2D_MULTISAMPLE: u32 = 0x9108;
    pub const SAMPLER_2D_MULTISAMPLE_ARRAY: u32 = 0x910B;
    pub const SAMPLER_CUBE_SHADOW: u32 = 0x8DC5;
    pub const SAMPLER_CUBE_MAP_ARRAY: u32 = 0x900C;
    pub const SAMPLER_BUFFER: u32 = 0x8DC2;
    pub const SAMPLER_2D_RECT: u32 = 0x8B63;
    pub const INT_SAMPLER_1D: u32 = 0x8DC9;
    pub const INT_SAMPLER_2D: u32 = 0x8DCA;
    pub const INT_SAMPLER_3D: u32 = 0x8DCB;
    pub const INT_SAMPLER_CUBE: u32 = 0x8DCC;
    pub const UNSIGNED_INT_SAMPLER_1D: u32 = 0x8DD1;
    pub const UNSIGNED_INT_SAMPLER_2D: u32 = 0x8DD2;
    pub const UNSIGNED_INT_SAMPLER_3D: u32 = 0x8DD3;
    pub const UNSIGNED_INT_SAMPLER_CUBE: u32 = 0x8DD4;
    pub const IMAGE_1D: u32 = 0x904C;
    pub const IMAGE_2D: u32 = 0x904D;
    pub const IMAGE_3D: u32 = 0x904E;
    pub const IMAGE_CUBE: u32 = 0x9050;
    pub const IMAGE_2D_ARRAY: u32 = 0x9053;
    pub const UNSIGNED_INT_ATOMIC_COUNTER: u32 = 0x92DB;

    /// GLSL spelling of a type tag, for diagnostics.
    pub fn name(tag: u32) -> &'static str {
        match tag {
            FLOAT => "float",
            FLOAT_VEC2 => "vec2",
            FLOAT_VEC3 => "vec3",
            FLOAT_VEC4 => "vec4",
            INT => "int",
            INT_VEC2 => "ivec2",
            INT_VEC3 => "ivec3",
            INT_VEC4 => "ivec4",
            UNSIGNED_INT => "uint",
            UNSIGNED_INT_VEC2 => "uvec2",
            UNSIGNED_INT_VEC3 => "uvec3",
            UNSIGNED_INT_VEC4 => "uvec4",
            BOOL => "bool",
            FLOAT_MAT2 => "mat2",
            FLOAT_MAT3 => "mat3",
            FLOAT_MAT4 => "mat4",
            DOUBLE => "double",
            SAMPLER_1D => "sampler1D",
            SAMPLER_2D => "sampler2D",
            SAMPLER_3D => "sampler3D",
            SAMPLER_CUBE => "samplerCube",
            SAMPLER_2D_ARRAY => "sampler2DArray",
            SAMPLER_BUFFER => "samplerBuffer",
            IMAGE_1D => "image1D",
            IMAGE_2D => "image2D",
            IMAGE_3D => "image3D",
            UNSIGNED_INT_ATOMIC_COUNTER => "atomic_uint",
            _ => "unknown",
        }
    }

    /// True for the closed set of sampler and image type tags.
    pub fn is_sampler(tag: u32) -> bool {
        matches!(
            tag,
            SAMPLER_1D
                | SAMPLER_2D
                | SAMPLER_3D
                | SAMPLER_CUBE
                | SAMPLER_1D_SHADOW
                | SAMPLER_2D_SHADOW
                | SAMPLER_1D_ARRAY
                | SAMPLER_2D_ARRAY
                | SAMPLER_1D_ARRAY_SHADOW
                | SAMPLER_2D_ARRAY_SHADOW
                | SAMPLER_2D_MULTISAMPLE
                | SAMPLER_2D_MULTISAMPLE_ARRAY
                | SAMPLER_CUBE_SHADOW
                | SAMPLER_CUBE_MAP_ARRAY
                | SAMPLER_BUFFER
                | SAMPLER_2D_RECT
                | INT_SAMPLER_1D
                | INT_SAMPLER_2D
                | INT_SAMPLER_3D
                | INT_SAMPLER_CUBE
                | UNSIGNED_INT_SAMPLER_1D
                | UNSIGNED_INT_SAMPLER_2D
                | UNSIGNED_INT_SAMPLER_3D
                | UNSIGNED_INT_SAMPLER_CUBE
                | IMAGE_1D
                | IMAGE_2D
                | IMAGE_3D
                | IMAGE_CUBE
                | IMAGE_2D_ARRAY
        )
    }
}

/// One active uniform as reported by the modern interface query.
#[derive(Clone, Debug)]
pub struct RawUniform {
    pub name: String,
    pub location: i32,
    pub ty: u32,
    pub array_len: u32,
    /// `-1` when the uniform lives in the default block.
    pub block_index: i32,
}

/// One member of a uniform or storage block.
#[derive(Clone, Debug)]
pub struct RawBlockMember {
    pub name: String,
    pub offset: i32,
    pub array_stride: i32,
    /// `0` marks an unsized trailing array in a storage block.
    pub array_len: u32,
    pub ty: u32,
}

#[derive(Clone, Debug)]
pub struct RawBlock {
    pub name: String,
    pub binding: u32,
    pub members: Vec<RawBlockMember>,
}

/// Raw data from the modern program-interface query.
#[derive(Clone, Debug, Default)]
pub struct InterfaceReflection {
    pub uniforms: Vec<RawUniform>,
    pub uniform_blocks: Vec<RawBlock>,
    pub storage_blocks: Vec<RawBlock>,
}

/// Raw data from the legacy per-index iteration. Only top-level names and
/// locations are available.
#[derive(Clone, Debug, Default)]
pub struct LegacyReflection {
    /// `(name, location, type tag, array size)` per active uniform.
    pub uniforms: Vec<(String, i32, u32, u32)>,
    /// Active uniform block names, indexed by block binding.
    pub uniform_blocks: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniformInfo {
    /// Location for default-block uniforms, `-1` for block members.
    pub location: i32,
    /// Byte offset for block members, `-1` for default-block uniforms.
    pub offset: i32,
    pub ty: u32,
    pub array_len: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    pub index: u32,
}

/// Per-program reflection tables. Populated once, read many; cleared when
/// the owning program is replaced.
#[derive(Debug, Default)]
pub struct UniformCache {
    populated: bool,
    uniforms: FastHashMap<String, UniformInfo>,
    uniform_blocks: FastHashMap<String, BlockInfo>,
    storage_blocks: FastHashMap<String, BlockInfo>,
    samplers: FastHashMap<String, ()>,
}

impl UniformCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_populated(&self) -> bool {
        self.populated
    }

    /// Drops every entry; the next populate call rebuilds the tables.
    pub fn clear(&mut self) {
        self.populated = false;
        self.uniforms.clear();
        self.uniform_blocks.clear();
        self.storage_blocks.clear();
        self.samplers.clear();
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformInfo> {
        self.uniforms.get(name)
    }

    pub fn has_uniform(&self, name: &str) -> bool {
        self.uniforms.contains_key(name)
    }

    pub fn uniform_block(&self, name: &str) -> Option<&BlockInfo> {
        self.uniform_blocks.get(name)
    }

    pub fn has_uniform_block(&self, name: &str) -> bool {
        self.uniform_blocks.contains_key(name)
    }

    pub fn storage_block(&self, name: &str) -> Option<&BlockInfo> {
        self.storage_blocks.get(name)
    }

    pub fn has_storage_block(&self, name: &str) -> bool {
        self.storage_blocks.contains_key(name)
    }

    pub fn is_sampler(&self, name: &str) -> bool {
        self.samplers.contains_key(name)
    }

    /// All sampler uniform names, in no particular order.
    pub fn sampler_names(&self) -> impl Iterator<Item = &str> {
        self.samplers.keys().map(String::as_str)
    }

    /// Populates from the modern interface query. Array uniforms register
    /// once per concrete index and once under the bare name with the full
    /// length, supporting both granular and bulk access.
    pub fn populate_interface(&mut self, raw: &InterfaceReflection) {
        self.clear();
        for uniform in &raw.uniforms {
            if uniform.block_index >= 0 {
                continue;
            }
            let base = base_name(&uniform.name);
            if uniform.array_len > 1 {
                for index in 0..uniform.array_len {
                    self.insert_uniform(
                        format!("{base}[{index}]"),
                        UniformInfo {
                            location: uniform.location + index as i32,
                            offset: -1,
                            ty: uniform.ty,
                            array_len: 1,
                        },
                    );
                }
            }
            self.insert_uniform(
                base.to_string(),
                UniformInfo {
                    location: uniform.location,
                    offset: -1,
                    ty: uniform.ty,
                    array_len: uniform.array_len.max(1),
                },
            );
        }

        for block in &raw.uniform_blocks {
            self.uniform_blocks
                .insert(block.name.clone(), BlockInfo { index: block.binding });
            self.block_members(block, false);
        }
        for block in &raw.storage_blocks {
            self.storage_blocks
                .insert(block.name.clone(), BlockInfo { index: block.binding });
            self.block_members(block, true);
        }
        self.populated = true;
    }

    fn block_members(&mut self, block: &RawBlock, storage: bool) {
        for member in &block.members {
            // atomic counters have their own binding model
            if member.ty == types::UNSIGNED_INT_ATOMIC_COUNTER {
                continue;
            }
            let base = base_name(&member.name);
            if member.array_len == 0 && storage {
                // trailing unsized array of a storage block
                self.insert_uniform(
                    base.to_string(),
                    UniformInfo {
                        location: -1,
                        offset: member.offset,
                        ty: member.ty,
                        array_len: 0,
                    },
                );
                continue;
            }
            if member.array_len > 1 {
                for index in 0..member.array_len {
                    self.insert_uniform(
                        format!("{base}[{index}]"),
                        UniformInfo {
                            location: -1,
                            offset: member.offset + member.array_stride * index as i32,
                            ty: member.ty,
                            array_len: 1,
                        },
                    );
                }
            }
            self.insert_uniform(
                base.to_string(),
                UniformInfo {
                    location: -1,
                    offset: member.offset,
                    ty: member.ty,
                    array_len: member.array_len.max(1),
                },
            );
        }
    }

    /// Populates from the legacy iteration. Struct-field uniforms (names
    /// containing `.`) are skipped; only top-level bindings are modeled.
    pub fn populate_legacy(&mut self, raw: &LegacyReflection) {
        self.clear();
        for (name, location, ty, size) in &raw.uniforms {
            if name.contains('.') {
                continue;
            }
            let base = base_name(name);
            if *size > 1 {
                for index in 0..*size {
                    self.insert_uniform(
                        format!("{base}[{index}]"),
                        UniformInfo {
                            location: location + index as i32,
                            offset: -1,
                            ty: *ty,
                            array_len: 1,
                        },
                    );
                }
            }
            self.insert_uniform(
                base.to_string(),
                UniformInfo {
                    location: *location,
                    offset: -1,
                    ty: *ty,
                    array_len: (*size).max(1),
                },
            );
        }
        for (index, name) in raw.uniform_blocks.iter().enumerate() {
            self.uniform_blocks
                .insert(name.clone(), BlockInfo { index: index as u32 });
        }
        self.populated = true;
    }

    fn insert_uniform(&mut self, name: String, info: UniformInfo) {
        if types::is_sampler(info.ty) {
            self.samplers.insert(name.clone(), ());
        }
        self.uniforms.insert(name, info);
    }
}

/// Strips a trailing `[0]`, which drivers append to array uniform names.
fn base_name(name: &str) -> &str {
    name.strip_suffix("[0]").unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::{
        types, InterfaceReflection, LegacyReflection, RawBlock, RawBlockMember, RawUniform,
        UniformCache,
    };

    fn float_uniform(name: &str, location: i32, array_len: u32) -> RawUniform {
        RawUniform {
            name: name.to_string(),
            location,
            ty: types::FLOAT_VEC4,
            array_len,
            block_index: -1,
        }
    }

    #[test]
    fn array_uniforms_register_per_index_and_bare() {
        let mut cache = UniformCache::new();
        cache.populate_interface(&InterfaceReflection {
            uniforms: vec![float_uniform("lights[0]", 3, 4)],
            ..Default::default()
        });
        assert_eq!(cache.uniform("lights").unwrap().array_len, 4);
        assert_eq!(cache.uniform("lights[0]").unwrap().location, 3);
        assert_eq!(cache.uniform("lights[2]").unwrap().location, 5);
        assert!(!cache.has_uniform("lights[4]"));
    }

    #[test]
    fn block_members_expand_with_stride() {
        let mut cache = UniformCache::new();
        cache.populate_interface(&InterfaceReflection {
            uniform_blocks: vec![RawBlock {
                name: "Camera".to_string(),
                binding: 1,
                members: vec![RawBlockMember {
                    name: "planes[0]".to_string(),
                    offset: 64,
                    array_stride: 16,
                    array_len: 6,
                    ty: types::FLOAT_VEC4,
                }],
            }],
            ..Default::default()
        });
        assert_eq!(cache.uniform_block("Camera").unwrap().index, 1);
        assert_eq!(cache.uniform("planes[0]").unwrap().offset, 64);
        assert_eq!(cache.uniform("planes[5]").unwrap().offset, 144);
        assert_eq!(cache.uniform("planes").unwrap().array_len, 6);
    }

    #[test]
    fn storage_block_trailing_unsized_array() {
        let mut cache = UniformCache::new();
        cache.populate_interface(&InterfaceReflection {
            storage_blocks: vec![RawBlock {
                name: "Particles".to_string(),
                binding: 0,
                members: vec![RawBlockMember {
                    name: "items[0]".to_string(),
                    offset: 16,
                    array_stride: 32,
                    array_len: 0,
                    ty: types::FLOAT_VEC4,
                }],
            }],
            ..Default::default()
        });
        assert!(cache.has_storage_block("Particles"));
        let items = cache.uniform("items").unwrap();
        assert_eq!(items.array_len, 0);
        assert_eq!(items.offset, 16);
        assert!(!cache.has_uniform("items[0]"));
    }

    #[test]
    fn samplers_classified() {
        let mut cache = UniformCache::new();
        cache.populate_interface(&InterfaceReflection {
            uniforms: vec![
                RawUniform {
                    name: "diffuse".to_string(),
                    location: 0,
                    ty: types::SAMPLER_2D,
                    array_len: 1,
                    block_index: -1,
                },
                float_uniform("tint", 1, 1),
            ],
            ..Default::default()
        });
        assert!(cache.is_sampler("diffuse"));
        assert!(!cache.is_sampler("tint"));
        assert_eq!(cache.sampler_names().count(), 1);
    }

    #[test]
    fn legacy_skips_struct_fields() {
        let mut cache = UniformCache::new();
        cache.populate_legacy(&LegacyReflection {
            uniforms: vec![
                ("color".to_string(), 0, types::FLOAT_VEC4, 1),
                ("light.position".to_string(), 1, types::FLOAT_VEC3, 1),
            ],
            uniform_blocks: vec!["Globals".to_string()],
        });
        assert!(cache.has_uniform("color"));
        assert!(!cache.has_uniform("light.position"));
        assert_eq!(cache.uniform_block("Globals").unwrap().index, 0);
    }

    #[test]
    fn clear_invalidates() {
        let mut cache = UniformCache::new();
        cache.populate_interface(&InterfaceReflection {
            uniforms: vec![float_uniform("tint", 0, 1)],
            ..Default::default()
        });
        assert!(cache.is_populated());
        cache.clear();
        assert!(!cache.is_populated());
        assert!(!cache.has_uniform("tint"));
    }

    #[test]
    fn block_uniforms_excluded_from_default_block() {
        let mut cache = UniformCache::new();
        cache.populate_interface(&InterfaceReflection {
            uniforms: vec![RawUniform {
                name: "view".to_string(),
                location: -1,
                ty: types::FLOAT_MAT4,
                array_len: 1,
                block_index: 2,
            }],
            ..Default::default()
        });
        assert!(!cache.has_uniform("view"));
    }
}
