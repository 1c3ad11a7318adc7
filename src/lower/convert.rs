//! Implicit numeric conversion, per §4.8 "implicit conversion".

use crate::diagnostics::DiagnosticKind;
use crate::ir::{BlockId, ConvertOp, Opcode, ValueId};
use crate::source::Span;
use crate::types::{TypeId, TypeKind};

use super::construct::resize_vector;
use super::context::LowerCtx;

/// Convert `value` (of type `from`) to `to`. Returns `value` unchanged
/// when the types already match. Forbidden conversions (aggregate,
/// pointer, opaque) report [`DiagnosticKind::ConversionImpossible`] and
/// return the unconverted value so the caller can keep lowering.
pub(super) fn convert(ctx: &mut LowerCtx, block: BlockId, value: ValueId, from: TypeId, to: TypeId, span: Span) -> ValueId {
    if from == to {
        return value;
    }
    let from_kind = ctx.types.kind(from).clone();
    let to_kind = ctx.types.kind(to).clone();

    let op = match (&from_kind, &to_kind) {
        (TypeKind::Int(fb) | TypeKind::Uint(fb), TypeKind::Int(tb) | TypeKind::Uint(tb)) => {
            if tb == fb {
                return value;
            } else if tb > fb {
                if from_kind.is_signed_integer() { ConvertOp::SExt } else { ConvertOp::ZExt }
            } else {
                ConvertOp::Trunc
            }
        }
        (TypeKind::Fp(fb), TypeKind::Fp(tb)) => {
            if tb == fb {
                return value;
            } else if tb > fb {
                ConvertOp::FpExt
            } else {
                ConvertOp::FpTrunc
            }
        }
        (TypeKind::Int(_), TypeKind::Fp(_)) => ConvertOp::SiToFp,
        (TypeKind::Uint(_), TypeKind::Fp(_)) => ConvertOp::UiToFp,
        (TypeKind::Fp(_), TypeKind::Int(_)) => ConvertOp::FpToSi,
        (TypeKind::Fp(_), TypeKind::Uint(_)) => ConvertOp::FpToUi,
        (TypeKind::Vec { element: fe, rows: fr }, TypeKind::Vec { element: te, rows: tr }) => {
            return resize_vector(ctx, block, value, *fe, *fr, *te, *tr, to, span);
        }
        _ => {
            ctx.error(DiagnosticKind::ConversionImpossible, span, "types are not convertible");
            return value;
        }
    };
    ctx.module.push_instruction(block, Some(to), Opcode::Convert { op, value }, span)
}
