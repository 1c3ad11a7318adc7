//! Vector/matrix constructors, struct initialisation, and default values,
//! per §4.8 "vector and matrix constructors" / "struct initialisation".

use std::collections::{HashMap, VecDeque};

use crate::ast::{Expr, InitialiserArg, TypeExpr};
use crate::diagnostics::DiagnosticKind;
use crate::ir::{BlockId, Constant, Opcode, ValueId, VectorIndex};
use crate::source::Span;
use crate::types::{TypeId, TypeKind};

use super::context::{LowerCtx, StructLayout};
use super::convert::convert;
use super::expr::{evaluated_type, lower_expr};

/// Build a zero value of `ty`; used to pad short vector/matrix
/// constructors and as the value of an implicit `return`.
pub(super) fn default_value(ctx: &mut LowerCtx, block: BlockId, ty: TypeId, span: Span) -> ValueId {
    match ctx.types.kind(ty).clone() {
        TypeKind::Bool => ctx.module.push_constant(ty, Constant::Bool(false)),
        TypeKind::Int(_) => ctx.module.push_constant(ty, Constant::I32(0)),
        TypeKind::Uint(_) => ctx.module.push_constant(ty, Constant::U32(0)),
        TypeKind::Fp(64) => ctx.module.push_constant(ty, Constant::F64(0.0)),
        TypeKind::Fp(_) => ctx.module.push_constant(ty, Constant::F32(0.0)),
        TypeKind::Vec { element, rows } => {
            let zero = default_value(ctx, block, element, span);
            let elements = vec![zero; rows as usize];
            ctx.module.push_instruction(block, Some(ty), Opcode::CompositeConstruct { elements }, span)
        }
        TypeKind::Mat { column, columns } => {
            let zero_col = default_value(ctx, block, column, span);
            let elements = vec![zero_col; columns as usize];
            ctx.module.push_instruction(block, Some(ty), Opcode::CompositeConstruct { elements }, span)
        }
        TypeKind::Composite { fields, .. } => {
            let elements = fields.iter().map(|&f| default_value(ctx, block, f, span)).collect();
            ctx.module.push_instruction(block, Some(ty), Opcode::CompositeConstruct { elements }, span)
        }
        _ => ctx.module.push_constant(ty, Constant::I32(0)),
    }
}

fn one_constant(ctx: &mut LowerCtx, elem_ty: TypeId) -> ValueId {
    match ctx.types.kind(elem_ty).clone() {
        TypeKind::Fp(64) => ctx.module.push_constant(elem_ty, Constant::F64(1.0)),
        TypeKind::Fp(_) => ctx.module.push_constant(elem_ty, Constant::F32(1.0)),
        TypeKind::Int(_) => ctx.module.push_constant(elem_ty, Constant::I32(1)),
        TypeKind::Uint(_) => ctx.module.push_constant(elem_ty, Constant::U32(1)),
        _ => ctx.module.push_constant(elem_ty, Constant::Bool(true)),
    }
}

/// `vecN -> vecM`: keep the first `min(N, M)` lanes, element-converted to
/// the target element type, and zero-pad the rest when `M > N`.
pub(super) fn resize_vector(
    ctx: &mut LowerCtx,
    block: BlockId,
    value: ValueId,
    from_element: TypeId,
    from_rows: u8,
    to_element: TypeId,
    to_rows: u8,
    to_ty: TypeId,
    span: Span,
) -> ValueId {
    let keep = from_rows.min(to_rows);
    let mut elements = Vec::with_capacity(to_rows as usize);
    for lane in 0..keep {
        let extracted = ctx.module.push_instruction(
            block,
            Some(from_element),
            Opcode::VectorExtract { base: value, index: VectorIndex::Constant(u32::from(lane)) },
            span,
        );
        elements.push(convert(ctx, block, extracted, from_element, to_element, span));
    }
    for _ in keep..to_rows {
        elements.push(default_value(ctx, block, to_element, span));
    }
    ctx.module.push_instruction(block, Some(to_ty), Opcode::CompositeConstruct { elements }, span)
}

fn initialiser_exprs(args: &[InitialiserArg]) -> Vec<&Expr> {
    args.iter()
        .map(|a| match a {
            InitialiserArg::Positional(e) | InitialiserArg::Named(_, e) => e,
        })
        .collect()
}

pub(super) fn lower_initialiser_call(ctx: &mut LowerCtx, block: &mut BlockId, ty: &TypeExpr, args: &[InitialiserArg], span: Span) -> ValueId {
    match ty {
        TypeExpr::Struct(name) => {
            let Some(layout) = ctx.structs.get(name).cloned() else {
                ctx.error(DiagnosticKind::UndefinedSymbol, span, format!("unknown struct '{name}'"));
                let target = ctx.lower_type(ty);
                return default_value(ctx, *block, target, span);
            };
            lower_struct_ctor(ctx, block, layout, args, span)
        }
        _ => {
            let target = ctx.lower_type(ty);
            match ctx.types.kind(target).clone() {
                TypeKind::Vec { element, rows } => lower_vector_ctor(ctx, block, target, element, rows, args, span),
                TypeKind::Mat { column, columns } => lower_matrix_ctor(ctx, block, target, column, columns, args, span),
                TypeKind::Composite { .. } => {
                    // Reached only for an anonymous/alias composite; resolve
                    // its layout the same way a named struct would.
                    let layout = StructLayout {
                        type_id: target,
                        fields: match ctx.types.kind(target).clone() {
                            TypeKind::Composite { fields, .. } => fields.into_iter().map(|f| (String::new(), f)).collect(),
                            _ => unreachable!(),
                        },
                    };
                    lower_struct_ctor(ctx, block, layout, args, span)
                }
                _ => {
                    let exprs = initialiser_exprs(args);
                    if let Some(&e) = exprs.first() {
                        let from = evaluated_type(ctx, e);
                        let v = lower_expr(ctx, block, e);
                        convert(ctx, *block, v, from, target, span)
                    } else {
                        default_value(ctx, *block, target, span)
                    }
                }
            }
        }
    }
}

fn lower_vector_ctor(ctx: &mut LowerCtx, block: &mut BlockId, target: TypeId, element: TypeId, rows: u8, args: &[InitialiserArg], span: Span) -> ValueId {
    let exprs = initialiser_exprs(args);

    if exprs.len() == 1 {
        let e = exprs[0];
        let from_ty = evaluated_type(ctx, e);
        let v = lower_expr(ctx, block, e);
        if matches!(ctx.types.kind(from_ty), TypeKind::Vec { .. }) {
            return convert(ctx, *block, v, from_ty, target, span);
        }
        let scalar = convert(ctx, *block, v, from_ty, element, span);
        let elements = vec![scalar; rows as usize];
        return ctx.module.push_instruction(*block, Some(target), Opcode::CompositeConstruct { elements }, span);
    }

    let mut elements = Vec::with_capacity(rows as usize);
    for e in exprs {
        if elements.len() >= rows as usize {
            break;
        }
        let from_ty = evaluated_type(ctx, e);
        let v = lower_expr(ctx, block, e);
        match ctx.types.kind(from_ty).clone() {
            TypeKind::Vec { element: src_elem, rows: src_rows } => {
                for lane in 0..src_rows {
                    if elements.len() >= rows as usize {
                        break;
                    }
                    let extracted = ctx.module.push_instruction(
                        *block,
                        Some(src_elem),
                        Opcode::VectorExtract { base: v, index: VectorIndex::Constant(u32::from(lane)) },
                        span,
                    );
                    elements.push(convert(ctx, *block, extracted, src_elem, element, span));
                }
            }
            _ => elements.push(convert(ctx, *block, v, from_ty, element, span)),
        }
    }
    while elements.len() < rows as usize {
        elements.push(default_value(ctx, *block, element, span));
    }
    ctx.module.push_instruction(*block, Some(target), Opcode::CompositeConstruct { elements }, span)
}

fn lower_matrix_ctor(ctx: &mut LowerCtx, block: &mut BlockId, target: TypeId, column_ty: TypeId, columns: u8, args: &[InitialiserArg], span: Span) -> ValueId {
    let exprs = initialiser_exprs(args);
    let (col_elem, col_rows) = match ctx.types.kind(column_ty).clone() {
        TypeKind::Vec { element, rows } => (element, rows),
        _ => unreachable!("a matrix's column type is always a vector"),
    };

    if exprs.len() == 1 {
        let e = exprs[0];
        let from_ty = evaluated_type(ctx, e);
        let v = lower_expr(ctx, block, e);
        match ctx.types.kind(from_ty).clone() {
            TypeKind::Int(_) | TypeKind::Uint(_) | TypeKind::Fp(_) => {
                let scalar = convert(ctx, *block, v, from_ty, col_elem, span);
                let zero = default_value(ctx, *block, col_elem, span);
                let mut cols = Vec::with_capacity(columns as usize);
                for c in 0..columns {
                    let mut lanes = vec![zero; col_rows as usize];
                    if (c as usize) < col_rows as usize {
                        lanes[c as usize] = scalar;
                    }
                    cols.push(ctx.module.push_instruction(*block, Some(column_ty), Opcode::CompositeConstruct { elements: lanes }, span));
                }
                return ctx.module.push_instruction(*block, Some(target), Opcode::CompositeConstruct { elements: cols }, span);
            }
            TypeKind::Mat { column: src_col, columns: src_cols } => {
                let (src_elem, src_rows) = match ctx.types.kind(src_col).clone() {
                    TypeKind::Vec { element, rows } => (element, rows),
                    _ => unreachable!(),
                };
                let one = one_constant(ctx, col_elem);
                let mut cols = Vec::with_capacity(columns as usize);
                for c in 0..columns {
                    if c < src_cols {
                        let src_column = ctx.module.push_instruction(
                            *block,
                            Some(src_col),
                            Opcode::CompositeExtract { base: v, indices: vec![u32::from(c)] },
                            span,
                        );
                        cols.push(resize_vector(ctx, *block, src_column, src_elem, src_rows, col_elem, col_rows, column_ty, span));
                    } else {
                        let zero = default_value(ctx, *block, col_elem, span);
                        let mut lanes = vec![zero; col_rows as usize];
                        if (c as usize) < col_rows as usize {
                            lanes[c as usize] = one;
                        }
                        cols.push(ctx.module.push_instruction(*block, Some(column_ty), Opcode::CompositeConstruct { elements: lanes }, span));
                    }
                }
                return ctx.module.push_instruction(*block, Some(target), Opcode::CompositeConstruct { elements: cols }, span);
            }
            _ => {}
        }
    }

    if exprs.len() == columns as usize {
        let mut cols = Vec::with_capacity(columns as usize);
        for e in &exprs {
            let from_ty = evaluated_type(ctx, e);
            let v = lower_expr(ctx, block, e);
            cols.push(convert(ctx, *block, v, from_ty, column_ty, span));
        }
        return ctx.module.push_instruction(*block, Some(target), Opcode::CompositeConstruct { elements: cols }, span);
    }

    let total = columns as usize * col_rows as usize;
    if exprs.len() == total {
        let mut cols = Vec::with_capacity(columns as usize);
        for c in 0..columns as usize {
            let mut lanes = Vec::with_capacity(col_rows as usize);
            for r in 0..col_rows as usize {
                let e = exprs[c * col_rows as usize + r];
                let from_ty = evaluated_type(ctx, e);
                let v = lower_expr(ctx, block, e);
                lanes.push(convert(ctx, *block, v, from_ty, col_elem, span));
            }
            cols.push(ctx.module.push_instruction(*block, Some(column_ty), Opcode::CompositeConstruct { elements: lanes }, span));
        }
        return ctx.module.push_instruction(*block, Some(target), Opcode::CompositeConstruct { elements: cols }, span);
    }

    ctx.error(DiagnosticKind::UnimplementedConstruct, span, "unrecognized matrix constructor argument shape");
    default_value(ctx, *block, target, span)
}

fn lower_struct_ctor(ctx: &mut LowerCtx, block: &mut BlockId, layout: StructLayout, args: &[InitialiserArg], span: Span) -> ValueId {
    let mut named: HashMap<&str, &Expr> = HashMap::new();
    let mut positional: VecDeque<&Expr> = VecDeque::new();
    for a in args {
        match a {
            InitialiserArg::Named(n, e) => {
                named.insert(n.as_str(), e);
            }
            InitialiserArg::Positional(e) => positional.push_back(e),
        }
    }

    let addr = ctx.module.push_instruction(*block, Some(layout.type_id), Opcode::Alloc { ty: layout.type_id }, span);
    let idx_ty = ctx.types.int32();
    for (index, (field_name, field_ty)) in layout.fields.iter().enumerate() {
        let value_expr = named.get(field_name.as_str()).copied().or_else(|| positional.pop_front());
        let stored = match value_expr {
            Some(e) => {
                let from = evaluated_type(ctx, e);
                let v = lower_expr(ctx, block, e);
                convert(ctx, *block, v, from, *field_ty, span)
            }
            None => default_value(ctx, *block, *field_ty, span),
        };
        let idx_const = ctx.module.push_constant(idx_ty, Constant::I32(index as i32));
        let field_ptr = ctx.module.push_instruction(*block, None, Opcode::GetPtr { base: addr, indices: vec![idx_const] }, span);
        ctx.module.push_instruction(*block, None, Opcode::Store { ptr: field_ptr, value: stored }, span);
    }

    ctx.module.push_instruction(*block, Some(layout.type_id), Opcode::Load { ptr: addr }, span)
}
