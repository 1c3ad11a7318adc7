//! Lowering context: the type/struct/function/buffer tables, the scoped
//! symbol table, and the break/continue target stacks.
//!
//! Plays the role the teacher's `CodeGen` struct (`codegen/state.rs`)
//! plays for LLVM text emission: one struct holding everything a lowering
//! pass needs to remember, minus anything emission-specific, since
//! `IrModule` already owns ids and instruction storage. Fields are
//! `pub(super)`, same visibility the teacher gives `CodeGen`'s own fields.

use std::collections::HashMap;

use crate::ast::{BufferDecl, BufferKind, Program, StructDecl, TypeExpr};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::ir::{BlockId, BufferRef, Decoration, FuncId, IrModule, StorageClass, ValueId};
use crate::source::Span;
use crate::types::{TypeId, TypeKind, TypeRegistry};

/// A struct's interned composite type plus its field order, so field
/// access can resolve a name to an index without re-walking the AST.
#[derive(Debug, Clone)]
pub(super) struct StructLayout {
    pub type_id: TypeId,
    pub fields: Vec<(String, TypeId)>,
}

pub(super) struct LowerCtx<'m> {
    pub(super) module: &'m mut IrModule,
    pub(super) types: &'m mut TypeRegistry,
    pub(super) structs: HashMap<String, StructLayout>,
    pub(super) functions: HashMap<String, FuncId>,
    pub(super) buffers: HashMap<String, ValueId>,
    scopes: Vec<HashMap<String, ValueId>>,
    break_stack: Vec<BlockId>,
    continue_stack: Vec<BlockId>,
    pub(super) current_function: Option<FuncId>,
    pub(super) return_type: TypeId,
    pub(super) diagnostics: Vec<Diagnostic>,
}

impl<'m> LowerCtx<'m> {
    pub(super) fn new(module: &'m mut IrModule, types: &'m mut TypeRegistry) -> Self {
        let return_type = types.void();
        LowerCtx {
            module,
            types,
            structs: HashMap::new(),
            functions: HashMap::new(),
            buffers: HashMap::new(),
            scopes: Vec::new(),
            break_stack: Vec::new(),
            continue_stack: Vec::new(),
            current_function: None,
            return_type,
            diagnostics: Vec::new(),
        }
    }

    pub(super) fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub(super) fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    pub(super) fn define(&mut self, name: String, address: ValueId) {
        self.scopes
            .last_mut()
            .expect("define called with no active scope")
            .insert(name, address);
    }

    pub(super) fn lookup(&self, name: &str) -> Option<ValueId> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name).copied())
    }

    /// A loop is both a `continue` and a `break` target.
    pub(super) fn push_loop(&mut self, continue_target: BlockId, break_target: BlockId) {
        self.continue_stack.push(continue_target);
        self.break_stack.push(break_target);
    }

    pub(super) fn pop_loop(&mut self) {
        self.continue_stack.pop();
        self.break_stack.pop();
    }

    /// A `switch` is a `break` target but not a `continue` target — a
    /// `continue` inside a switch arm still targets the enclosing loop.
    pub(super) fn push_switch(&mut self, break_target: BlockId) {
        self.break_stack.push(break_target);
    }

    pub(super) fn pop_switch(&mut self) {
        self.break_stack.pop();
    }

    pub(super) fn break_target(&self) -> Option<BlockId> {
        self.break_stack.last().copied()
    }

    pub(super) fn continue_target(&self) -> Option<BlockId> {
        self.continue_stack.last().copied()
    }

    pub(super) fn error(&mut self, kind: DiagnosticKind, span: Span, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::new(kind, span).with_message(message));
    }

    /// Lower an AST type into this module's type table.
    pub(super) fn lower_type(&mut self, ty: &TypeExpr) -> TypeId {
        match ty {
            TypeExpr::Builtin(b) => self.types.lower_builtin(*b),
            TypeExpr::Struct(name) => self
                .structs
                .get(name)
                .map(|layout| layout.type_id)
                .unwrap_or_else(|| self.types.void()),
            TypeExpr::Array { base, size } => {
                let element = self.lower_type(base);
                self.types.intern(TypeKind::Array { element, length: *size })
            }
        }
    }

    /// Intern every struct declaration up front so field-access lowering
    /// never has to re-derive a layout mid-function.
    pub(super) fn declare_structs(&mut self, structs: &[&StructDecl]) {
        for s in structs {
            let fields: Vec<(String, TypeId)> = s
                .fields
                .iter()
                .map(|f| (f.name.clone(), self.lower_type(&f.ty)))
                .collect();
            let field_types = fields.iter().map(|(_, t)| *t).collect();
            let type_id = self.types.intern(TypeKind::Composite {
                fields: field_types,
                name: Some(s.name.clone()),
            });
            self.structs.insert(s.name.clone(), StructLayout { type_id, fields });
        }
    }

    /// Lower every top-level buffer declaration into a module-level
    /// argument value, per §4.8's stage-argument storage-class derivation
    /// generalized to buffers (whose storage class follows their kind
    /// rather than an attribute).
    pub(super) fn declare_buffers(&mut self, program: &Program) {
        let buffers: Vec<&BufferDecl> = program
            .decls
            .iter()
            .filter_map(|d| match d {
                crate::ast::Decl::Buffer(b) => Some(b),
                _ => None,
            })
            .collect();
        for buffer in buffers {
            self.declare_buffer(buffer);
        }
    }

    fn declare_buffer(&mut self, buffer: &BufferDecl) {
        let field_types: Vec<(String, TypeId)> = buffer
            .fields
            .iter()
            .map(|f| (f.name.clone(), self.lower_type(&f.ty)))
            .collect();
        let fields = field_types.iter().map(|(_, t)| *t).collect();
        let type_id = self.types.intern(TypeKind::Composite {
            fields,
            name: Some(buffer.name.clone()),
        });
        let storage_class = match buffer.kind {
            BufferKind::Uniform => StorageClass::Uniform,
            BufferKind::PushConstant => StorageClass::PushConstant,
            BufferKind::Storage => StorageClass::Buffer,
        };
        let buffer_ref = BufferRef {
            pass: self.module.pass_name.clone(),
            name: buffer.name.clone(),
        };
        let decorations: Vec<Decoration> = buffer
            .attributes
            .iter()
            .filter(|a| a.name == "layout")
            .flat_map(|a| a.args.iter())
            .filter_map(|arg| match arg {
                crate::ast::AttributeArg::Named(name, crate::ast::Literal::Int { value, .. }) => {
                    Some(Decoration { name: name.clone(), value: Some(*value as i64) })
                }
                _ => None,
            })
            .collect();
        let value = self.module.push_argument(type_id, storage_class, None, Some(buffer_ref), decorations);
        self.buffers.insert(buffer.name.clone(), value);
    }
}
