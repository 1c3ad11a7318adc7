//! Expression lowering: rvalues, addresses, operator/builtin-call
//! dispatch, and assignment (including swizzle targets).

use crate::ast::{CompoundOp, Expr, ExprKind, Literal};
use crate::builtins::{self, ArithOp, BitwiseOp, ComparePred};
use crate::diagnostics::DiagnosticKind;
use crate::ir::{BlockId, CmpOp, Constant, Opcode, ValueId, VectorIndex};
use crate::source::Span;
use crate::types::{TypeId, TypeKind};

use super::construct::{default_value, lower_initialiser_call};
use super::context::LowerCtx;
use super::convert::convert;

const ARITH: &[(&str, ArithOp)] = &[
    ("+", ArithOp::Add),
    ("-", ArithOp::Sub),
    ("*", ArithOp::Mul),
    ("/", ArithOp::Div),
    ("%", ArithOp::Rem),
];

const BITWISE: &[(&str, BitwiseOp)] = &[
    ("&", BitwiseOp::And),
    ("|", BitwiseOp::Or),
    ("^", BitwiseOp::Xor),
    ("<<", BitwiseOp::Shl),
    (">>", BitwiseOp::Shr),
];

const COMPARE: &[(&str, ComparePred)] = &[
    ("==", ComparePred::Eq),
    ("!=", ComparePred::Neq),
    ("<", ComparePred::Lt),
    (">", ComparePred::Gt),
    ("<=", ComparePred::Le),
    (">=", ComparePred::Ge),
];

const SWIZZLE_SETS: [[char; 4]; 3] = [['x', 'y', 'z', 'w'], ['r', 'g', 'b', 'a'], ['s', 't', 'p', 'q']];

fn swizzle_lane(c: char) -> Option<u32> {
    SWIZZLE_SETS
        .iter()
        .find_map(|set| set.iter().position(|&s| s == c).map(|p| p as u32))
}

/// Resolve an expression's analysis-time type into this module's type
/// table. Lowering never computes types itself (§1 non-goals); a missing
/// `evaluated_type` means the AST was not produced by a real analysis
/// pass, which is fatal to the enclosing declaration.
pub(super) fn evaluated_type(ctx: &mut LowerCtx, expr: &Expr) -> TypeId {
    match &expr.evaluated_type {
        Some(ty) => ctx.lower_type(ty),
        None => {
            ctx.error(DiagnosticKind::NonConvertibleTypes, expr.span, "expression has no evaluated type");
            ctx.types.void()
        }
    }
}

/// Lower `expr` to its rvalue. Identifiers/field-access/index go through
/// [`get_address`] and a `load`, per §4.8 "rvalue lowering of an
/// identifier is load(get_address(id))" — generalized to every
/// address-shaped expression except vector swizzles, which are never
/// addressable.
pub(super) fn lower_expr(ctx: &mut LowerCtx, block: &mut BlockId, expr: &Expr) -> ValueId {
    match &expr.kind {
        ExprKind::Literal(lit) => lower_literal(ctx, *lit, expr),
        ExprKind::Default { ty } => {
            let target = ctx.lower_type(ty);
            default_value(ctx, *block, target, expr.span)
        }
        ExprKind::Reinterpret { .. } => {
            ctx.error(DiagnosticKind::UnimplementedConstruct, expr.span, "reinterpret is not lowered");
            let ty = evaluated_type(ctx, expr);
            default_value(ctx, *block, ty, expr.span)
        }
        ExprKind::Identifier(_) | ExprKind::Index { .. } => {
            let ty = evaluated_type(ctx, expr);
            let addr = get_address(ctx, block, expr);
            ctx.module.push_instruction(*block, Some(ty), Opcode::Load { ptr: addr }, expr.span)
        }
        ExprKind::FieldAccess { base, field } => {
            let base_ty = evaluated_type(ctx, base);
            match ctx.types.kind(base_ty).clone() {
                TypeKind::Vec { element, .. } => lower_swizzle_read(ctx, block, base, field, element, expr),
                _ => {
                    let ty = evaluated_type(ctx, expr);
                    let addr = get_address(ctx, block, expr);
                    ctx.module.push_instruction(*block, Some(ty), Opcode::Load { ptr: addr }, expr.span)
                }
            }
        }
        ExprKind::If { condition, then_expr, else_expr } => lower_if_expr(ctx, block, condition, then_expr, else_expr, expr),
        ExprKind::Assignment { op, target, value } => lower_assignment(ctx, block, *op, target, value, expr.span),
        ExprKind::InitialiserCall { ty, args } => lower_initialiser_call(ctx, block, ty, args, expr.span),
        ExprKind::Call { callee, args } => lower_call(ctx, block, callee, args, expr),
    }
}

fn lower_literal(ctx: &mut LowerCtx, lit: Literal, expr: &Expr) -> ValueId {
    let ty = evaluated_type(ctx, expr);
    match lit {
        Literal::Bool(b) => ctx.module.push_constant(ty, Constant::Bool(b)),
        Literal::Int { value, unsigned } => {
            if unsigned {
                ctx.module.push_constant(ty, Constant::U32(value as u32))
            } else {
                ctx.module.push_constant(ty, Constant::I32(value as i32))
            }
        }
        Literal::Float { value, is_f64 } => {
            if is_f64 {
                ctx.module.push_constant(ty, Constant::F64(value))
            } else {
                ctx.module.push_constant(ty, Constant::F32(value as f32))
            }
        }
    }
}

/// Get a pointer to `expr`'s storage. Vector field access never reaches
/// here (handled as a swizzle read/write instead, per §4.8: "vector-field
/// access is not addressable").
pub(super) fn get_address(ctx: &mut LowerCtx, block: &mut BlockId, expr: &Expr) -> ValueId {
    match &expr.kind {
        ExprKind::Identifier(name) => ctx.lookup(name).unwrap_or_else(|| {
            ctx.error(DiagnosticKind::UndefinedSymbol, expr.span, format!("undefined symbol '{name}'"));
            let void = ctx.types.void();
            ctx.module.push_instruction(*block, Some(void), Opcode::Alloc { ty: void }, expr.span)
        }),
        ExprKind::FieldAccess { base, field } => {
            let base_ty = evaluated_type(ctx, base);
            let base_addr = get_address(ctx, block, base);
            let field_index = struct_field_index(ctx, base_ty, field);
            let idx_ty = ctx.types.int32();
            let idx_const = ctx.module.push_constant(idx_ty, Constant::I32(field_index as i32));
            ctx.module.push_instruction(*block, None, Opcode::GetPtr { base: base_addr, indices: vec![idx_const] }, expr.span)
        }
        ExprKind::Index { base, index } => {
            let base_addr = get_address(ctx, block, base);
            let idx_val = lower_expr(ctx, block, index);
            ctx.module.push_instruction(*block, None, Opcode::GetPtr { base: base_addr, indices: vec![idx_val] }, expr.span)
        }
        ExprKind::If { condition, then_expr, else_expr } => lower_if_address(ctx, block, condition, then_expr, else_expr, expr.span),
        _ => {
            ctx.error(DiagnosticKind::UnaddressableLValue, expr.span, "expression does not have an address");
            let void = ctx.types.void();
            ctx.module.push_instruction(*block, Some(void), Opcode::Alloc { ty: void }, expr.span)
        }
    }
}

fn struct_field_index(ctx: &LowerCtx, struct_ty: TypeId, field: &str) -> u32 {
    if let TypeKind::Composite { name: Some(name), .. } = ctx.types.kind(struct_ty) {
        if let Some(layout) = ctx.structs.get(name) {
            if let Some(i) = layout.fields.iter().position(|(n, _)| n == field) {
                return i as u32;
            }
        }
    }
    0
}

fn lower_swizzle_read(ctx: &mut LowerCtx, block: &mut BlockId, base: &Expr, field: &str, element: TypeId, expr: &Expr) -> ValueId {
    let base_val = lower_expr(ctx, block, base);
    let lanes: Vec<u32> = field.chars().filter_map(swizzle_lane).collect();
    if lanes.len() == 1 {
        return ctx.module.push_instruction(*block, Some(element), Opcode::VectorExtract { base: base_val, index: VectorIndex::Constant(lanes[0]) }, expr.span);
    }
    let result_ty = evaluated_type(ctx, expr);
    let elements = lanes
        .iter()
        .map(|&lane| ctx.module.push_instruction(*block, Some(element), Opcode::VectorExtract { base: base_val, index: VectorIndex::Constant(lane) }, expr.span))
        .collect();
    ctx.module.push_instruction(*block, Some(result_ty), Opcode::CompositeConstruct { elements }, expr.span)
}

/// A value-producing `if (cond) then_expr else else_expr`: both arms are
/// lowered into their own block, converted to the expression's result
/// type, and merged with a `phi` at the converge block, per §4.8.
fn lower_if_expr(ctx: &mut LowerCtx, block: &mut BlockId, condition: &Expr, then_expr: &Expr, else_expr: &Expr, expr: &Expr) -> ValueId {
    let func = ctx.current_function.expect("lowering an if-expression outside a function body");
    let result_ty = evaluated_type(ctx, expr);
    let cond_ty = evaluated_type(ctx, condition);
    let cond_val = lower_expr(ctx, block, condition);
    let bool_ty = ctx.types.bool_type();
    let cond_val = convert(ctx, *block, cond_val, cond_ty, bool_ty, condition.span);

    let then_block = ctx.module.new_block(func);
    let else_block = ctx.module.new_block(func);
    let converge = ctx.module.new_block(func);
    ctx.module.push_instruction(*block, None, Opcode::ScfBranchHead { converge }, expr.span);
    ctx.module.push_instruction(*block, None, Opcode::BrCond { cond: cond_val, then_block, else_block }, expr.span);

    let mut then_cursor = then_block;
    let then_ty = evaluated_type(ctx, then_expr);
    let then_val = lower_expr(ctx, &mut then_cursor, then_expr);
    let then_val = convert(ctx, then_cursor, then_val, then_ty, result_ty, then_expr.span);
    ctx.module.push_instruction(then_cursor, None, Opcode::Branch { target: converge }, expr.span);

    let mut else_cursor = else_block;
    let else_ty = evaluated_type(ctx, else_expr);
    let else_val = lower_expr(ctx, &mut else_cursor, else_expr);
    let else_val = convert(ctx, else_cursor, else_val, else_ty, result_ty, else_expr.span);
    ctx.module.push_instruction(else_cursor, None, Opcode::Branch { target: converge }, expr.span);

    *block = converge;
    ctx.module.push_instruction(converge, Some(result_ty), Opcode::Phi { incoming: vec![(then_val, then_cursor), (else_val, else_cursor)] }, expr.span)
}

/// Address-producing counterpart of [`lower_if_expr`]: each arm's address
/// (not value) is computed and the two pointers are merged with `phi`.
fn lower_if_address(ctx: &mut LowerCtx, block: &mut BlockId, condition: &Expr, then_expr: &Expr, else_expr: &Expr, span: Span) -> ValueId {
    let func = ctx.current_function.expect("lowering an if-expression outside a function body");
    let cond_ty = evaluated_type(ctx, condition);
    let cond_val = lower_expr(ctx, block, condition);
    let bool_ty = ctx.types.bool_type();
    let cond_val = convert(ctx, *block, cond_val, cond_ty, bool_ty, condition.span);

    let then_block = ctx.module.new_block(func);
    let else_block = ctx.module.new_block(func);
    let converge = ctx.module.new_block(func);
    ctx.module.push_instruction(*block, None, Opcode::ScfBranchHead { converge }, span);
    ctx.module.push_instruction(*block, None, Opcode::BrCond { cond: cond_val, then_block, else_block }, span);

    let mut then_cursor = then_block;
    let then_addr = get_address(ctx, &mut then_cursor, then_expr);
    ctx.module.push_instruction(then_cursor, None, Opcode::Branch { target: converge }, span);

    let mut else_cursor = else_block;
    let else_addr = get_address(ctx, &mut else_cursor, else_expr);
    ctx.module.push_instruction(else_cursor, None, Opcode::Branch { target: converge }, span);

    *block = converge;
    ctx.module.push_instruction(converge, None, Opcode::Phi { incoming: vec![(then_addr, then_cursor), (else_addr, else_cursor)] }, span)
}

fn is_vector_swizzle_target(ctx: &mut LowerCtx, target: &Expr) -> bool {
    if let ExprKind::FieldAccess { base, .. } = &target.kind {
        let base_ty = evaluated_type(ctx, base);
        matches!(ctx.types.kind(base_ty), TypeKind::Vec { .. })
    } else {
        false
    }
}

fn compound_alu_op(op: CompoundOp, ty: &TypeKind, types: &crate::types::TypeRegistry) -> crate::ir::AluOp {
    match op {
        CompoundOp::Add => builtins::dispatch_arith(ArithOp::Add, ty, types),
        CompoundOp::Sub => builtins::dispatch_arith(ArithOp::Sub, ty, types),
        CompoundOp::Mul => builtins::dispatch_arith(ArithOp::Mul, ty, types),
        CompoundOp::Div => builtins::dispatch_arith(ArithOp::Div, ty, types),
        CompoundOp::Rem => builtins::dispatch_arith(ArithOp::Rem, ty, types),
        CompoundOp::And => builtins::dispatch_bitwise(BitwiseOp::And),
        CompoundOp::Or => builtins::dispatch_bitwise(BitwiseOp::Or),
        CompoundOp::Xor => builtins::dispatch_bitwise(BitwiseOp::Xor),
        CompoundOp::Shl => builtins::dispatch_bitwise(BitwiseOp::Shl),
        CompoundOp::Shr => builtins::dispatch_bitwise(BitwiseOp::Shr),
        CompoundOp::Assign => unreachable!("the caller handles plain assignment before dispatching an ALU op"),
    }
}

fn lower_assignment(ctx: &mut LowerCtx, block: &mut BlockId, op: CompoundOp, target: &Expr, value: &Expr, span: Span) -> ValueId {
    if is_vector_swizzle_target(ctx, target) {
        return lower_swizzle_assignment(ctx, block, op, target, value, span);
    }
    let target_ty = evaluated_type(ctx, target);
    let addr = get_address(ctx, block, target);
    let rhs_ty = evaluated_type(ctx, value);
    let rhs_val = lower_expr(ctx, block, value);
    let rhs_val = convert(ctx, *block, rhs_val, rhs_ty, target_ty, value.span);

    let stored = if op == CompoundOp::Assign {
        rhs_val
    } else {
        let current = ctx.module.push_instruction(*block, Some(target_ty), Opcode::Load { ptr: addr }, span);
        let target_kind = ctx.types.kind(target_ty).clone();
        let alu = compound_alu_op(op, &target_kind, ctx.types);
        ctx.module.push_instruction(*block, Some(target_ty), Opcode::Alu { op: alu, lhs: current, rhs: Some(rhs_val) }, span)
    };
    ctx.module.push_instruction(*block, None, Opcode::Store { ptr: addr, value: stored }, span);
    stored
}

/// Swizzle-target assignment: load the base vector, extract/combine/insert
/// one lane at a time, then store the whole vector back, per §4.8's
/// worked example for `v.xy += u.xy`.
fn lower_swizzle_assignment(ctx: &mut LowerCtx, block: &mut BlockId, op: CompoundOp, target: &Expr, value: &Expr, span: Span) -> ValueId {
    let ExprKind::FieldAccess { base, field } = &target.kind else {
        unreachable!("caller already checked this is a swizzle target")
    };
    let base_ty = evaluated_type(ctx, base);
    let (element, _rows) = match ctx.types.kind(base_ty).clone() {
        TypeKind::Vec { element, rows } => (element, rows),
        _ => unreachable!("caller already checked the base is a vector"),
    };
    let base_addr = get_address(ctx, block, base);
    let mut current = ctx.module.push_instruction(*block, Some(base_ty), Opcode::Load { ptr: base_addr }, span);

    let lanes: Vec<u32> = field.chars().filter_map(swizzle_lane).collect();
    let rhs_ty = evaluated_type(ctx, value);
    let rhs_val = lower_expr(ctx, block, value);
    let rhs_is_vector = matches!(ctx.types.kind(rhs_ty), TypeKind::Vec { .. });

    for (i, &lane) in lanes.iter().enumerate() {
        let rhs_lane = if rhs_is_vector {
            ctx.module.push_instruction(*block, Some(element), Opcode::VectorExtract { base: rhs_val, index: VectorIndex::Constant(i as u32) }, span)
        } else {
            convert(ctx, *block, rhs_val, rhs_ty, element, span)
        };
        let new_lane = if op == CompoundOp::Assign {
            rhs_lane
        } else {
            let prior = ctx.module.push_instruction(*block, Some(element), Opcode::VectorExtract { base: current, index: VectorIndex::Constant(lane) }, span);
            let element_kind = ctx.types.kind(element).clone();
            let alu = compound_alu_op(op, &element_kind, ctx.types);
            ctx.module.push_instruction(*block, Some(element), Opcode::Alu { op: alu, lhs: prior, rhs: Some(rhs_lane) }, span)
        };
        current = ctx.module.push_instruction(*block, Some(base_ty), Opcode::VectorInsert { base: current, value: new_lane, index: VectorIndex::Constant(lane) }, span);
    }

    ctx.module.push_instruction(*block, None, Opcode::Store { ptr: base_addr, value: current }, span);
    current
}

/// Short-circuit `&&`/`||`: not an opcode, per §4.6 — the lowerer emits a
/// branch plus a `phi` combining a constant (the short-circuited path)
/// with the right-hand side's value (the evaluated path).
fn lower_short_circuit(ctx: &mut LowerCtx, block: &mut BlockId, op: &str, lhs: &Expr, rhs: &Expr, expr: &Expr) -> ValueId {
    let func = ctx.current_function.expect("lowering a logical operator outside a function body");
    let bool_ty = ctx.types.bool_type();

    let lhs_ty = evaluated_type(ctx, lhs);
    let lhs_val = lower_expr(ctx, block, lhs);
    let lhs_val = convert(ctx, *block, lhs_val, lhs_ty, bool_ty, lhs.span);

    let rhs_block = ctx.module.new_block(func);
    let converge = ctx.module.new_block(func);

    let (then_block, else_block, short_value) = if op == "&&" {
        (rhs_block, converge, false)
    } else {
        (converge, rhs_block, true)
    };
    ctx.module.push_instruction(*block, None, Opcode::ScfBranchHead { converge }, expr.span);
    ctx.module.push_instruction(*block, None, Opcode::BrCond { cond: lhs_val, then_block, else_block }, expr.span);
    let entry_block = *block;

    let mut rhs_cursor = rhs_block;
    let rhs_ty = evaluated_type(ctx, rhs);
    let rhs_val = lower_expr(ctx, &mut rhs_cursor, rhs);
    let rhs_val = convert(ctx, rhs_cursor, rhs_val, rhs_ty, bool_ty, rhs.span);
    ctx.module.push_instruction(rhs_cursor, None, Opcode::Branch { target: converge }, expr.span);

    let short_const = ctx.module.push_constant(bool_ty, Constant::Bool(short_value));

    *block = converge;
    ctx.module.push_instruction(
        converge,
        Some(bool_ty),
        Opcode::Phi { incoming: vec![(short_const, entry_block), (rhs_val, rhs_cursor)] },
        expr.span,
    )
}

fn lower_call(ctx: &mut LowerCtx, block: &mut BlockId, callee: &str, args: &[Expr], expr: &Expr) -> ValueId {
    let result_ty = evaluated_type(ctx, expr);

    if callee == "&&" || callee == "||" {
        return lower_short_circuit(ctx, block, callee, &args[0], &args[1], expr);
    }
    if callee == "-" && args.len() == 1 {
        let v = lower_expr(ctx, block, &args[0]);
        let result_kind = ctx.types.kind(result_ty).clone();
        let op = builtins::dispatch_arith(ArithOp::Neg, &result_kind, ctx.types);
        return ctx.module.push_instruction(*block, Some(result_ty), Opcode::Alu { op, lhs: v, rhs: None }, expr.span);
    }
    if callee == "!" && args.len() == 1 {
        let v = lower_expr(ctx, block, &args[0]);
        let bool_ty = ctx.types.bool_type();
        let zero = ctx.module.push_constant(bool_ty, Constant::Bool(false));
        return ctx.module.push_instruction(*block, Some(bool_ty), Opcode::Cmp { op: CmpOp::IEqual, lhs: v, rhs: zero }, expr.span);
    }
    if callee == "~" && args.len() == 1 {
        let v = lower_expr(ctx, block, &args[0]);
        let op = builtins::dispatch_bitwise(BitwiseOp::Not);
        return ctx.module.push_instruction(*block, Some(result_ty), Opcode::Alu { op, lhs: v, rhs: None }, expr.span);
    }
    if let Some(&(_, op)) = ARITH.iter().find(|(name, _)| *name == callee) {
        let lhs = lower_expr(ctx, block, &args[0]);
        let rhs = lower_expr(ctx, block, &args[1]);
        let result_kind = ctx.types.kind(result_ty).clone();
        let alu = builtins::dispatch_arith(op, &result_kind, ctx.types);
        return ctx.module.push_instruction(*block, Some(result_ty), Opcode::Alu { op: alu, lhs, rhs: Some(rhs) }, expr.span);
    }
    if let Some(&(_, op)) = BITWISE.iter().find(|(name, _)| *name == callee) {
        let lhs = lower_expr(ctx, block, &args[0]);
        let rhs = lower_expr(ctx, block, &args[1]);
        let alu = builtins::dispatch_bitwise(op);
        return ctx.module.push_instruction(*block, Some(result_ty), Opcode::Alu { op: alu, lhs, rhs: Some(rhs) }, expr.span);
    }
    if let Some(&(_, pred)) = COMPARE.iter().find(|(name, _)| *name == callee) {
        let lhs_ty = evaluated_type(ctx, &args[0]);
        let lhs = lower_expr(ctx, block, &args[0]);
        let rhs = lower_expr(ctx, block, &args[1]);
        let lhs_kind = ctx.types.kind(lhs_ty).clone();
        let cmp = builtins::dispatch_compare(pred, &lhs_kind, ctx.types);
        return ctx.module.push_instruction(*block, Some(result_ty), Opcode::Cmp { op: cmp, lhs, rhs }, expr.span);
    }

    let result_kind = ctx.types.kind(result_ty).clone();
    match builtins::dispatch_builtin_call(callee, &result_kind, ctx.types) {
        Ok(kind) => {
            let arg_vals = args.iter().map(|a| lower_expr(ctx, block, a)).collect();
            ctx.module.push_instruction(*block, Some(result_ty), Opcode::ExtCall { kind, args: arg_vals }, expr.span)
        }
        Err(DiagnosticKind::UndefinedSymbol) => {
            if ctx.structs.contains_key(callee) {
                lower_struct_call(ctx, block, callee, args, expr)
            } else {
                lower_user_call(ctx, block, callee, args, result_ty, expr)
            }
        }
        Err(kind) => {
            ctx.error(kind, expr.span, format!("no builtin variant for '{callee}'"));
            default_value(ctx, *block, result_ty, expr.span)
        }
    }
}

fn lower_struct_call(ctx: &mut LowerCtx, block: &mut BlockId, name: &str, args: &[Expr], expr: &Expr) -> ValueId {
    let init_args: Vec<crate::ast::InitialiserArg> = args.iter().cloned().map(crate::ast::InitialiserArg::Positional).collect();
    lower_initialiser_call(ctx, block, &crate::ast::TypeExpr::Struct(name.to_string()), &init_args, expr.span)
}

fn lower_user_call(ctx: &mut LowerCtx, block: &mut BlockId, callee: &str, args: &[Expr], result_ty: TypeId, expr: &Expr) -> ValueId {
    let Some(&function) = ctx.functions.get(callee) else {
        ctx.error(DiagnosticKind::UndefinedSymbol, expr.span, format!("undefined function '{callee}'"));
        return default_value(ctx, *block, result_ty, expr.span);
    };
    let arg_vals = args.iter().map(|a| lower_expr(ctx, block, a)).collect();
    ctx.module.push_instruction(*block, Some(result_ty), Opcode::Call { function, args: arg_vals }, expr.span)
}
