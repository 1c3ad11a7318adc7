//! `if`/`switch`/`for`/`while`/`do-while` lowering.

use crate::ast::{Block, Expr, Stmt, SwitchArm};
use crate::ir::{BlockId, Opcode};
use crate::source::Span;
use crate::types::TypeId;

use super::context::LowerCtx;
use super::convert::convert;
use super::expr::{evaluated_type, lower_expr};
use super::stmt::{lower_block, lower_stmt};

fn lower_condition(ctx: &mut LowerCtx, block: &mut BlockId, condition: &Expr, bool_ty: TypeId) -> crate::ir::ValueId {
    let ty = evaluated_type(ctx, condition);
    let v = lower_expr(ctx, block, condition);
    convert(ctx, *block, v, ty, bool_ty, condition.span)
}

/// `if`/`else`: each arm lowers into its own block and branches to a
/// shared converge block unless it already terminated. If both arms
/// terminate, no converge block is ever branched to and the statement as
/// a whole is terminating — per §4.8's "both branches terminate" rule, no
/// implicit converge is wired in that case.
pub(super) fn lower_if_stmt(ctx: &mut LowerCtx, block: &mut BlockId, condition: &Expr, then_branch: &Block, else_branch: Option<&Stmt>, span: Span) -> bool {
    let func = ctx.current_function.expect("if statement outside a function body");
    let bool_ty = ctx.types.bool_type();
    let cond_val = lower_condition(ctx, block, condition, bool_ty);

    let then_block = ctx.module.new_block(func);
    let else_block = ctx.module.new_block(func);
    let converge = ctx.module.new_block(func);
    ctx.module.push_instruction(*block, None, Opcode::ScfBranchHead { converge }, span);
    ctx.module.push_instruction(*block, None, Opcode::BrCond { cond: cond_val, then_block, else_block }, span);

    let mut then_cursor = then_block;
    let then_terminated = lower_block(ctx, &mut then_cursor, then_branch);
    if !then_terminated {
        ctx.module.push_instruction(then_cursor, None, Opcode::Branch { target: converge }, span);
    }

    let mut else_cursor = else_block;
    let else_terminated = match else_branch {
        Some(stmt) => lower_stmt(ctx, &mut else_cursor, stmt),
        None => false,
    };
    if !else_terminated {
        ctx.module.push_instruction(else_cursor, None, Opcode::Branch { target: converge }, span);
    }

    if then_terminated && else_terminated {
        true
    } else {
        *block = converge;
        false
    }
}

/// `switch`: one block per arm plus a converge block. Arms fall through
/// to the next arm's block unless they terminate, matching C semantics;
/// `break` targets converge via [`LowerCtx::push_switch`]. The statement
/// is always treated as non-terminating even when every arm (including
/// an explicit default) terminates — a documented simplification that
/// avoids a full reachability analysis over arm labels.
pub(super) fn lower_switch_stmt(ctx: &mut LowerCtx, block: &mut BlockId, selector: &Expr, arms: &[SwitchArm], span: Span) -> bool {
    let func = ctx.current_function.expect("switch statement outside a function body");
    let selector_ty = evaluated_type(ctx, selector);
    let selector_val = lower_expr(ctx, block, selector);
    let int_ty = ctx.types.int32();
    let selector_val = convert(ctx, *block, selector_val, selector_ty, int_ty, selector.span);

    let converge = ctx.module.new_block(func);
    let arm_blocks: Vec<BlockId> = arms.iter().map(|_| ctx.module.new_block(func)).collect();
    let default_block = arms
        .iter()
        .position(|arm| arm.is_default)
        .map(|i| arm_blocks[i])
        .unwrap_or(converge);

    let cases: Vec<(i64, BlockId)> = arms
        .iter()
        .zip(&arm_blocks)
        .flat_map(|(arm, &b)| arm.labels.iter().map(move |&label| (label, b)))
        .collect();

    ctx.module.push_instruction(*block, None, Opcode::ScfBranchHead { converge }, span);
    ctx.module.push_instruction(*block, None, Opcode::Switch { selector: selector_val, default: default_block, cases }, span);

    ctx.push_switch(converge);
    for (i, arm) in arms.iter().enumerate() {
        let mut cursor = arm_blocks[i];
        let mut terminated = false;
        for stmt in &arm.body {
            if lower_stmt(ctx, &mut cursor, stmt) {
                terminated = true;
                break;
            }
        }
        if !terminated {
            let fallthrough = arm_blocks.get(i + 1).copied().unwrap_or(converge);
            ctx.module.push_instruction(cursor, None, Opcode::Branch { target: fallthrough }, arm.span);
        }
    }
    ctx.pop_switch();

    *block = converge;
    false
}

pub(super) fn lower_for_stmt(ctx: &mut LowerCtx, block: &mut BlockId, init: Option<&Stmt>, condition: Option<&Expr>, step: &[Expr], body: &Block, span: Span) -> bool {
    let func = ctx.current_function.expect("for statement outside a function body");
    ctx.push_scope();
    if let Some(init) = init {
        lower_stmt(ctx, block, init);
    }

    let cond_block = ctx.module.new_block(func);
    let loop_block = ctx.module.new_block(func);
    let continuation_block = ctx.module.new_block(func);
    let converge = ctx.module.new_block(func);
    ctx.module.push_instruction(*block, None, Opcode::Branch { target: cond_block }, span);

    lower_loop_condition(ctx, cond_block, condition, loop_block, converge, span);

    ctx.push_loop(continuation_block, converge);
    let mut body_cursor = loop_block;
    let terminated = lower_block(ctx, &mut body_cursor, body);
    if !terminated {
        ctx.module.push_instruction(body_cursor, None, Opcode::Branch { target: continuation_block }, span);
    }
    ctx.pop_loop();

    let mut step_cursor = continuation_block;
    for expr in step {
        lower_expr(ctx, &mut step_cursor, expr);
    }
    ctx.module.push_instruction(step_cursor, None, Opcode::Branch { target: cond_block }, span);

    ctx.pop_scope();
    *block = converge;
    false
}

pub(super) fn lower_while_stmt(ctx: &mut LowerCtx, block: &mut BlockId, condition: &Expr, body: &Block, span: Span) -> bool {
    let func = ctx.current_function.expect("while statement outside a function body");
    let cond_block = ctx.module.new_block(func);
    let loop_block = ctx.module.new_block(func);
    let converge = ctx.module.new_block(func);
    ctx.module.push_instruction(*block, None, Opcode::Branch { target: cond_block }, span);

    lower_loop_condition(ctx, cond_block, Some(condition), loop_block, converge, span);

    ctx.push_loop(cond_block, converge);
    let mut body_cursor = loop_block;
    let terminated = lower_block(ctx, &mut body_cursor, body);
    if !terminated {
        ctx.module.push_instruction(body_cursor, None, Opcode::Branch { target: cond_block }, span);
    }
    ctx.pop_loop();

    *block = converge;
    false
}

/// `do`/`while`: the body runs once unconditionally before the first
/// condition check, so the loop body is entered directly rather than
/// through the condition block.
pub(super) fn lower_do_while_stmt(ctx: &mut LowerCtx, block: &mut BlockId, body: &Block, condition: &Expr, span: Span) -> bool {
    let func = ctx.current_function.expect("do-while statement outside a function body");
    let loop_block = ctx.module.new_block(func);
    let cond_block = ctx.module.new_block(func);
    let converge = ctx.module.new_block(func);
    ctx.module.push_instruction(*block, None, Opcode::Branch { target: loop_block }, span);

    ctx.push_loop(cond_block, converge);
    let mut body_cursor = loop_block;
    let terminated = lower_block(ctx, &mut body_cursor, body);
    if !terminated {
        ctx.module.push_instruction(body_cursor, None, Opcode::Branch { target: cond_block }, span);
    }
    ctx.pop_loop();

    lower_loop_condition(ctx, cond_block, Some(condition), loop_block, converge, span);

    *block = converge;
    false
}

/// Shared `for`/`while`/`do-while` condition-block body: a missing
/// condition (bare `for (;;)`) always branches to the loop body.
fn lower_loop_condition(ctx: &mut LowerCtx, cond_block: BlockId, condition: Option<&Expr>, loop_block: BlockId, converge: BlockId, span: Span) {
    let mut cursor = cond_block;
    match condition {
        Some(condition) => {
            let bool_ty = ctx.types.bool_type();
            let cond_val = lower_condition(ctx, &mut cursor, condition, bool_ty);
            ctx.module.push_instruction(cursor, None, Opcode::ScfBranchHead { converge }, span);
            ctx.module.push_instruction(cursor, None, Opcode::BrCond { cond: cond_val, then_block: loop_block, else_block: converge }, span);
        }
        None => {
            ctx.module.push_instruction(cursor, None, Opcode::Branch { target: loop_block }, span);
        }
    }
}
