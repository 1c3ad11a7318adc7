//! Type system: builtin surface types and the interned IR type registry
//!
//! Two layers, mirroring the split the spec draws between AST-level
//! builtin type syntax (§3 "Types") and IR-level interned types (§4.6):
//!
//! - [`BuiltinType`] is what the parser produces for a type expression
//!   (`vec3`, `mat4x4`, `sampler2DArray`, ...).
//! - [`TypeKind`]/[`TypeRegistry`] is the canonical, hash-consed IR type
//!   table every lowered type is interned into.
//!
//! The registry itself is new: the teacher's row-polymorphic `Type`/
//! `StackType` derive structural `Hash`/`Eq` but are never interned, since
//! stack-effect types don't need canonical pointer identity the way a
//! fixed type system does. Everything downstream of "structurally equal
//! types share one id" is this module's job, per the invariant in §3:
//! `ptr(T1) == ptr(T2) <=> structurally_equal(T1, T2)`.

use fnv::FnvHashMap;

/// Scalar element kind, shared by vectors, matrices and images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    Int,
    Uint,
    Float,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageDim {
    D1,
    D2,
    D3,
    Cube,
    Buffer,
    Rect,
    Subpass,
}

/// The (sampled-type, dim, arrayed, multisampled, depth, pure-texture)
/// tuple from §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageDescriptor {
    pub sampled_type: ScalarKind,
    pub dim: ImageDim,
    pub arrayed: bool,
    pub multisampled: bool,
    pub depth: bool,
    /// True for a "pure" texture with no implicit sampler attached
    /// (`textureCube` as opposed to `samplerCube`).
    pub pure_texture: bool,
}

/// A type as written in source, before hash-consing into the IR registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinType {
    Void,
    Bool,
    Int,
    Uint,
    Float,
    Double,
    /// `vecN` of float.
    Vec(u8),
    /// `dvecN` of double.
    Dvec(u8),
    /// `bvecN` of bool.
    Bvec(u8),
    /// `ivecN` of int.
    Ivec(u8),
    /// `uvecN` of uint.
    Uvec(u8),
    /// `matCxR` of float, columns x rows.
    Mat(u8, u8),
    /// `dmatCxR` of double.
    Dmat(u8, u8),
    Sampler,
    Image(ImageDescriptor),
    SampledImage(ImageDescriptor),
}

/// Canonical, interned IR type. Kinds per §3.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Void,
    Bool,
    Int(u8),
    Uint(u8),
    Fp(u8),
    Vec { element: TypeId, rows: u8 },
    Mat { column: TypeId, columns: u8 },
    Array { element: TypeId, length: Option<u32> },
    Composite { fields: Vec<TypeId>, name: Option<String> },
    Pointer,
    Sampler,
    Image(ImageDescriptor),
    SampledImage(ImageDescriptor),
}

impl TypeKind {
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            TypeKind::Bool | TypeKind::Int(_) | TypeKind::Uint(_) | TypeKind::Fp(_)
        )
    }

    #[must_use]
    pub fn is_signed_integer(&self) -> bool {
        matches!(self, TypeKind::Int(_))
    }

    #[must_use]
    pub fn is_unsigned_integer(&self) -> bool {
        matches!(self, TypeKind::Uint(_))
    }

    #[must_use]
    pub fn is_floating_point(&self) -> bool {
        matches!(self, TypeKind::Fp(_))
    }

    #[must_use]
    pub fn is_integer(&self) -> bool {
        self.is_signed_integer() || self.is_unsigned_integer()
    }
}

/// Opaque handle into [`TypeRegistry`]; the "canonical pointer" of §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    #[must_use]
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Hash-consing table: structural hash (backed by `fnv`'s 64-bit FNV-1a as
/// `HashMap`'s `BuildHasher`) over a canonical key, full structural
/// comparison on collision via `TypeKind`'s derived `Eq`. Append-only
/// within a compilation (§4.6).
pub struct TypeRegistry {
    kinds: Vec<TypeKind>,
    index: FnvHashMap<TypeKind, TypeId>,
}

impl TypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        let mut reg = TypeRegistry {
            kinds: Vec::new(),
            index: FnvHashMap::default(),
        };
        // Pre-intern the scalars every builtin lowering path bottoms out in.
        reg.intern(TypeKind::Void);
        reg.intern(TypeKind::Bool);
        reg
    }

    /// Intern `kind`, returning its canonical id. Structurally equal kinds
    /// (including equal child ids, since children are already canonical)
    /// always return the same id.
    pub fn intern(&mut self, kind: TypeKind) -> TypeId {
        if let Some(&id) = self.index.get(&kind) {
            return id;
        }
        let id = TypeId(self.kinds.len() as u32);
        self.kinds.push(kind.clone());
        self.index.insert(kind, id);
        id
    }

    #[must_use]
    pub fn kind(&self, id: TypeId) -> &TypeKind {
        &self.kinds[id.index() as usize]
    }

    #[must_use]
    pub fn void(&self) -> TypeId {
        TypeId(0)
    }

    #[must_use]
    pub fn bool_type(&self) -> TypeId {
        TypeId(1)
    }

    pub fn int32(&mut self) -> TypeId {
        self.intern(TypeKind::Int(32))
    }

    pub fn uint32(&mut self) -> TypeId {
        self.intern(TypeKind::Uint(32))
    }

    pub fn fp32(&mut self) -> TypeId {
        self.intern(TypeKind::Fp(32))
    }

    pub fn fp64(&mut self) -> TypeId {
        self.intern(TypeKind::Fp(64))
    }

    pub fn vec(&mut self, element: TypeId, rows: u8) -> TypeId {
        self.intern(TypeKind::Vec { element, rows })
    }

    pub fn mat(&mut self, column: TypeId, columns: u8) -> TypeId {
        self.intern(TypeKind::Mat { column, columns })
    }

    /// Lower a [`BuiltinType`] (surface syntax) into its canonical
    /// [`TypeId`]: vector/matrix types map onto `vec(element, rows)` /
    /// `mat(vec, cols)`; image/sampler types encode the tuple from §3
    /// directly.
    pub fn lower_builtin(&mut self, builtin: BuiltinType) -> TypeId {
        match builtin {
            BuiltinType::Void => self.void(),
            BuiltinType::Bool => self.bool_type(),
            BuiltinType::Int => self.int32(),
            BuiltinType::Uint => self.uint32(),
            BuiltinType::Float => self.fp32(),
            BuiltinType::Double => self.fp64(),
            BuiltinType::Vec(n) => {
                let e = self.fp32();
                self.vec(e, n)
            }
            BuiltinType::Dvec(n) => {
                let e = self.fp64();
                self.vec(e, n)
            }
            BuiltinType::Bvec(n) => {
                let e = self.bool_type();
                self.vec(e, n)
            }
            BuiltinType::Ivec(n) => {
                let e = self.int32();
                self.vec(e, n)
            }
            BuiltinType::Uvec(n) => {
                let e = self.uint32();
                self.vec(e, n)
            }
            BuiltinType::Mat(cols, rows) => {
                let e = self.fp32();
                let col = self.vec(e, rows);
                self.mat(col, cols)
            }
            BuiltinType::Dmat(cols, rows) => {
                let e = self.fp64();
                let col = self.vec(e, rows);
                self.mat(col, cols)
            }
            BuiltinType::Sampler => self.intern(TypeKind::Sampler),
            BuiltinType::Image(desc) => self.intern(TypeKind::Image(desc)),
            BuiltinType::SampledImage(desc) => self.intern(TypeKind::SampledImage(desc)),
        }
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        TypeRegistry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_structures_share_one_id() {
        let mut reg = TypeRegistry::new();
        let a = reg.lower_builtin(BuiltinType::Vec(3));
        let b = reg.lower_builtin(BuiltinType::Vec(3));
        assert_eq!(a, b);
    }

    #[test]
    fn different_rows_are_different_ids() {
        let mut reg = TypeRegistry::new();
        let v3 = reg.lower_builtin(BuiltinType::Vec(3));
        let v4 = reg.lower_builtin(BuiltinType::Vec(4));
        assert_ne!(v3, v4);
    }

    #[test]
    fn matrix_maps_to_vec_of_columns() {
        let mut reg = TypeRegistry::new();
        let m = reg.lower_builtin(BuiltinType::Mat(4, 4));
        match reg.kind(m).clone() {
            TypeKind::Mat { column, columns } => {
                assert_eq!(columns, 4);
                assert_eq!(
                    *reg.kind(column),
                    TypeKind::Vec {
                        element: reg.fp32(),
                        rows: 4
                    }
                );
            }
            other => panic!("expected Mat, got {other:?}"),
        }
    }

    #[test]
    fn composite_with_same_fields_and_name_interns_once() {
        let mut reg = TypeRegistry::new();
        let i = reg.int32();
        let f = reg.fp32();
        let a = reg.intern(TypeKind::Composite {
            fields: vec![i, f],
            name: Some("Light".to_string()),
        });
        let b = reg.intern(TypeKind::Composite {
            fields: vec![i, f],
            name: Some("Light".to_string()),
        });
        assert_eq!(a, b);
        let c = reg.intern(TypeKind::Composite {
            fields: vec![i, f],
            name: Some("Other".to_string()),
        });
        assert_ne!(a, c);
    }

    #[test]
    fn signedness_classification() {
        let mut reg = TypeRegistry::new();
        let i = reg.int32();
        let u = reg.uint32();
        let f = reg.fp32();
        assert!(reg.kind(i).is_signed_integer());
        assert!(reg.kind(u).is_unsigned_integer());
        assert!(reg.kind(f).is_floating_point());
    }
}
