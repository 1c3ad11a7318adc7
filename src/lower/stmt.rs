//! Statement and function-body lowering.

use crate::ast::{
    Attribute, AttributeArg, Block, FunctionDecl, Literal, Stmt, StageFunctionDecl,
};
use crate::diagnostics::DiagnosticKind;
use crate::ir::{BlockId, Decoration, FuncId, Opcode, StorageClass};
use crate::source::Span;

use super::construct::default_value;
use super::context::LowerCtx;
use super::control_flow::{lower_do_while_stmt, lower_for_stmt, lower_if_stmt, lower_switch_stmt, lower_while_stmt};
use super::convert::convert;
use super::expr::{evaluated_type, lower_expr};

/// Derive a parameter's storage class and decorations from its
/// attributes, per §4.8's stage-argument storage-class derivation. Plain
/// function parameters default to [`StorageClass::Automatic`]; the
/// caller supplies a different default for stage entry points.
fn param_storage(attributes: &[Attribute], default: StorageClass) -> (StorageClass, Vec<Decoration>) {
    let mut storage_class = default;
    let mut decorations = Vec::new();
    for attr in attributes {
        match attr.name.as_str() {
            "in" => storage_class = StorageClass::Input,
            "out" => storage_class = StorageClass::Output,
            "uniform" => storage_class = StorageClass::Uniform,
            "push_constant" => storage_class = StorageClass::PushConstant,
            "buffer" => storage_class = StorageClass::Buffer,
            "layout" => {
                decorations.extend(attr.args.iter().filter_map(|arg| match arg {
                    AttributeArg::Named(name, Literal::Int { value, .. }) => Some(Decoration { name: name.clone(), value: Some(*value as i64) }),
                    _ => None,
                }));
            }
            _ => {}
        }
    }
    (storage_class, decorations)
}

/// Append a `return` to every reachable block lacking a terminator, per
/// §4.8: the lowerer never assumes a well-formed function falls off the
/// end, it makes that explicit instead.
fn insert_implicit_returns(ctx: &mut LowerCtx, func: FuncId, return_type: crate::types::TypeId, span: Span) {
    let void = ctx.types.void();
    for block_id in ctx.module.reachable_blocks(func) {
        if !ctx.module.block(block_id).has_terminator(ctx.module) {
            let value = if return_type == void {
                None
            } else {
                Some(default_value(ctx, block_id, return_type, span))
            };
            ctx.module.push_instruction(block_id, None, Opcode::Return { value }, span);
        }
    }
}

/// Shared body for plain and stage-entry functions: bind parameters to
/// freshly-allocated, store-initialized addresses (so the symbol table
/// always maps a name to a pointer, by-value or not — a deliberate
/// simplification over special-casing by-value params as bare values),
/// lower the body, and plug any fallthrough with implicit returns.
fn lower_function_body(
    ctx: &mut LowerCtx,
    func: FuncId,
    entry: BlockId,
    params: &[crate::ast::Param],
    return_type: crate::types::TypeId,
    body: &Block,
    default_storage: StorageClass,
    span: Span,
) {
    let previous_function = ctx.current_function.replace(func);
    let previous_return = std::mem::replace(&mut ctx.return_type, return_type);

    ctx.push_scope();
    for param in params {
        let ty = ctx.lower_type(&param.ty);
        let (storage_class, decorations) = param_storage(&param.attributes, default_storage);
        let arg = ctx.module.push_argument(ty, storage_class, None, None, decorations);
        ctx.module.function_mut(func).arguments.push(arg);
        let addr = ctx.module.push_instruction(entry, Some(ty), Opcode::Alloc { ty }, param.span);
        ctx.module.push_instruction(entry, None, Opcode::Store { ptr: addr, value: arg }, param.span);
        ctx.define(param.name.clone(), addr);
    }

    let mut cursor = entry;
    lower_block(ctx, &mut cursor, body);
    ctx.pop_scope();

    insert_implicit_returns(ctx, func, return_type, span);

    ctx.current_function = previous_function;
    ctx.return_type = previous_return;
}

/// Lower `decl`'s body into the function `func` already allocated for it
/// (by a prior pre-pass over every [`FunctionDecl`] in the module, so
/// forward references resolve against a fully-populated `ctx.functions`
/// before any body is lowered). Returns whether the function should stay
/// registered in the output; the caller un-registers it otherwise.
pub(super) fn lower_function_decl(ctx: &mut LowerCtx, decl: &FunctionDecl, func: FuncId) -> bool {
    let existing = ctx.module.function(func);
    let return_type = existing.return_type;
    let entry = existing.entry;
    let diagnostics_before = ctx.diagnostics.len();
    lower_function_body(ctx, func, entry, &decl.params, return_type, &decl.body, StorageClass::Automatic, decl.span);
    !ctx.diagnostics[diagnostics_before..]
        .iter()
        .any(|d| d.severity() != crate::diagnostics::Severity::Recoverable)
}

/// Stage entry points default their parameters to [`StorageClass::Input`]
/// (they are the pipeline's inputs unless annotated otherwise), unlike
/// plain functions whose unattributed parameters stay `Automatic`.
pub(super) fn lower_stage_function(ctx: &mut LowerCtx, decl: &StageFunctionDecl) -> bool {
    let return_type = ctx.lower_type(&decl.return_type);
    let (func, entry) = ctx.module.new_function(format!("{}::{:?}", decl.pass, decl.stage), return_type);
    let diagnostics_before = ctx.diagnostics.len();
    lower_function_body(ctx, func, entry, &decl.params, return_type, &decl.body, StorageClass::Input, decl.span);
    ctx.module.entry = func;
    !ctx.diagnostics[diagnostics_before..]
        .iter()
        .any(|d| d.severity() != crate::diagnostics::Severity::Recoverable)
}

/// Lower a block's statements in a fresh scope, stopping as soon as one
/// statement reports itself as terminating — later statements are
/// unreachable and are not lowered, per §4.8 "unreachable code is not an
/// error, it is simply dropped". Returns whether the block terminated.
pub(super) fn lower_block(ctx: &mut LowerCtx, block: &mut BlockId, body: &Block) -> bool {
    ctx.push_scope();
    let mut terminated = false;
    for stmt in &body.statements {
        if lower_stmt(ctx, block, stmt) {
            terminated = true;
            break;
        }
    }
    ctx.pop_scope();
    terminated
}

pub(super) fn lower_stmt(ctx: &mut LowerCtx, block: &mut BlockId, stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Block(b) => lower_block(ctx, block, b),
        Stmt::If { condition, then_branch, else_branch, span } => lower_if_stmt(ctx, block, condition, then_branch, else_branch.as_deref(), *span),
        Stmt::Switch { selector, arms, span } => lower_switch_stmt(ctx, block, selector, arms, *span),
        Stmt::For { init, condition, step, body, span } => lower_for_stmt(ctx, block, init.as_deref(), condition.as_ref(), step, body, *span),
        Stmt::While { condition, body, span } => lower_while_stmt(ctx, block, condition, body, *span),
        Stmt::DoWhile { body, condition, span } => lower_do_while_stmt(ctx, block, body, condition, *span),
        Stmt::Return { value, span } => {
            let return_value = value.as_ref().map(|expr| {
                let ty = evaluated_type(ctx, expr);
                let v = lower_expr(ctx, block, expr);
                convert(ctx, *block, v, ty, ctx.return_type, expr.span)
            });
            ctx.module.push_instruction(*block, None, Opcode::Return { value: return_value }, *span);
            true
        }
        Stmt::Break { span } => {
            if let Some(target) = ctx.break_target() {
                ctx.module.push_instruction(*block, None, Opcode::Branch { target }, *span);
            } else {
                ctx.error(DiagnosticKind::BreakOutsideLoop, *span, "break outside a loop or switch");
                ctx.module.push_instruction(*block, None, Opcode::Unreachable, *span);
            }
            true
        }
        Stmt::Continue { span } => {
            if let Some(target) = ctx.continue_target() {
                ctx.module.push_instruction(*block, None, Opcode::Branch { target }, *span);
            } else {
                ctx.error(DiagnosticKind::ContinueOutsideLoop, *span, "continue outside a loop");
                ctx.module.push_instruction(*block, None, Opcode::Unreachable, *span);
            }
            true
        }
        Stmt::Discard { span } => {
            ctx.module.push_instruction(*block, None, Opcode::Die, *span);
            true
        }
        Stmt::Expression { expr, .. } => {
            lower_expr(ctx, block, expr);
            false
        }
        Stmt::Variable(var) => {
            lower_var_decl(ctx, block, var);
            false
        }
    }
}

fn lower_var_decl(ctx: &mut LowerCtx, block: &mut BlockId, var: &crate::ast::VarDecl) {
    let declared_ty = var.ty.as_ref().map(|t| ctx.lower_type(t));
    let init_ty = var.init.as_ref().map(|e| evaluated_type(ctx, e));
    let ty = declared_ty.or(init_ty).unwrap_or_else(|| ctx.types.void());

    let addr = ctx.module.push_instruction(*block, Some(ty), Opcode::Alloc { ty }, var.span);
    let value = match &var.init {
        Some(expr) => {
            let v = lower_expr(ctx, block, expr);
            convert(ctx, *block, v, init_ty.unwrap(), ty, expr.span)
        }
        None => default_value(ctx, *block, ty, var.span),
    };
    ctx.module.push_instruction(*block, None, Opcode::Store { ptr: addr, value }, var.span);
    ctx.define(var.name.clone(), addr);
}
