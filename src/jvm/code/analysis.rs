//! Recomputation of the `max_stack`/`max_locals` bounds of a method.
//!
//! This is a size analysis, not a type checker: it tracks only the operand
//! stack *depth* along every control flow path, the way class file writers
//! compute maxs. Per-instruction depth changes that depend on more than the
//! opcode (field and method descriptors, `multianewarray` dimensions) are
//! resolved through the constant pool.

use crate::jvm::class_file::ConstantPool;
use crate::jvm::code::{Code, Insn};
use crate::jvm::descriptors::MethodDescriptor;
use crate::jvm::errors::ClassFileError;

/// Recompute the operand stack and local variable limits of `code`
///
/// `descriptor` and `is_static` describe the method owning the code: they
/// determine the parameter slots that are live on entry.
pub fn compute_limits(
    code: &Code,
    pool: &ConstantPool,
    descriptor: &MethodDescriptor,
    is_static: bool,
) -> Result<(u16, u16), ClassFileError> {
    Ok((
        max_stack(code, pool)?,
        max_locals(code, descriptor, is_static),
    ))
}

/// Highest local variable slot bound: parameter slots plus every slot
/// referenced by a load, store, `iinc`, or `ret`
pub fn max_locals(code: &Code, descriptor: &MethodDescriptor, is_static: bool) -> u16 {
    let mut max = descriptor.parameter_length(!is_static);
    for insn in &code.instructions {
        if let Some(end) = local_slot_end(insn) {
            max = max.max(end);
        }
    }
    max
}

/// Deepest operand stack reachable on any path through the code
///
/// A worklist walk over instruction indices; exception handlers are seeded
/// with the single thrown reference on their stack.
pub fn max_stack(code: &Code, pool: &ConstantPool) -> Result<u16, ClassFileError> {
    let count = code.instructions.len();
    if count == 0 {
        return Ok(0);
    }

    let mut deepest_seen: Vec<Option<u16>> = vec![None; count];
    let mut worklist: Vec<(usize, u16)> = vec![(0, 0)];
    for handler in &code.exception_table {
        worklist.push((handler.handler, 1));
    }

    let mut max = 0u16;
    while let Some((index, depth)) = worklist.pop() {
        if index >= count {
            continue;
        }
        match deepest_seen[index] {
            Some(seen) if seen >= depth => continue,
            _ => deepest_seen[index] = Some(depth),
        }

        let insn = &code.instructions[index];
        let after = i32::from(depth) + stack_delta(insn, pool)?;
        if after > i32::from(u16::MAX) {
            return Err(ClassFileError::Malformed(
                "operand stack overflows during analysis".to_string(),
            ));
        }
        // Underflow means the walk reached code with an inconsistent stack
        // shape (e.g. an unusual subroutine); size analysis stays at zero
        let after = after.max(0) as u16;
        max = max.max(depth).max(after);

        match insn {
            // The pushed return address is consumed inside the subroutine,
            // so the fallthrough resumes at the depth before the jump
            Insn::Jsr(target) | Insn::JsrW(target) => {
                worklist.push((*target, after));
                worklist.push((index + 1, depth));
            }
            _ => {
                for target in insn.jump_targets() {
                    worklist.push((target, after));
                }
                if !insn.ends_block() {
                    worklist.push((index + 1, after));
                }
            }
        }
    }

    Ok(max)
}

/// One past the highest local slot the instruction touches, or `None` for
/// instructions that do not reference locals
fn local_slot_end(insn: &Insn) -> Option<u16> {
    use Insn::*;
    Some(match insn {
        ILoad(slot) | FLoad(slot) | ALoad(slot) | IStore(slot) | FStore(slot) | AStore(slot)
        | Ret(slot) | IInc(slot, _) => u16::from(*slot) + 1,
        LLoad(slot) | DLoad(slot) | LStore(slot) | DStore(slot) => u16::from(*slot) + 2,
        ILoadW(slot) | FLoadW(slot) | ALoadW(slot) | IStoreW(slot) | FStoreW(slot)
        | AStoreW(slot) | RetW(slot) | IIncW(slot, _) => *slot + 1,
        LLoadW(slot) | DLoadW(slot) | LStoreW(slot) | DStoreW(slot) => *slot + 2,
        ILoad0 | FLoad0 | ALoad0 | IStore0 | FStore0 | AStore0 => 1,
        ILoad1 | FLoad1 | ALoad1 | IStore1 | FStore1 | AStore1 => 2,
        ILoad2 | FLoad2 | ALoad2 | IStore2 | FStore2 | AStore2 => 3,
        ILoad3 | FLoad3 | ALoad3 | IStore3 | FStore3 | AStore3 => 4,
        LLoad0 | DLoad0 | LStore0 | DStore0 => 2,
        LLoad1 | DLoad1 | LStore1 | DStore1 => 3,
        LLoad2 | DLoad2 | LStore2 | DStore2 => 4,
        LLoad3 | DLoad3 | LStore3 | DStore3 => 5,
        _ => return None,
    })
}

/// Net operand stack change of executing the instruction once
fn stack_delta(insn: &Insn, pool: &ConstantPool) -> Result<i32, ClassFileError> {
    use Insn::*;
    let delta = match insn {
        Nop | Swap | INeg | LNeg | FNeg | DNeg | I2F | F2I | I2B | I2C | I2S | L2D | D2L
        | IInc(_, _) | IIncW(_, _) | Goto(_) | GotoW(_) | Ret(_) | RetW(_) | Return
        | NewArray(_) | ANewArray(_) | ArrayLength | CheckCast(_) | InstanceOf(_) => 0,

        AConstNull | IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5
        | FConst0 | FConst1 | FConst2 | BiPush(_) | SiPush(_) | Ldc(_) | LdcW(_) | ILoad(_)
        | FLoad(_) | ALoad(_) | ILoadW(_) | FLoadW(_) | ALoadW(_) | ILoad0 | ILoad1 | ILoad2
        | ILoad3 | FLoad0 | FLoad1 | FLoad2 | FLoad3 | ALoad0 | ALoad1 | ALoad2 | ALoad3
        | Dup | DupX1 | DupX2 | I2L | I2D | F2L | F2D | New(_) | Jsr(_) | JsrW(_) => 1,

        LConst0 | LConst1 | DConst0 | DConst1 | Ldc2W(_) | LLoad(_) | DLoad(_) | LLoadW(_)
        | DLoadW(_) | LLoad0 | LLoad1 | LLoad2 | LLoad3 | DLoad0 | DLoad1 | DLoad2 | DLoad3
        | Dup2 | Dup2X1 | Dup2X2 => 2,

        IALoad | FALoad | AALoad | BALoad | CALoad | SALoad | IStore(_) | FStore(_)
        | AStore(_) | IStoreW(_) | FStoreW(_) | AStoreW(_) | IStore0 | IStore1 | IStore2
        | IStore3 | FStore0 | FStore1 | FStore2 | FStore3 | AStore0 | AStore1 | AStore2
        | AStore3 | Pop | IAdd | FAdd | ISub | FSub | IMul | FMul | IDiv | FDiv | IRem
        | FRem | IShl | IShr | IUShr | LShl | LShr | LUShr | IAnd | IOr | IXor | L2I | L2F
        | D2I | D2F | FCmpL | FCmpG | IfEq(_) | IfNe(_) | IfLt(_) | IfGe(_) | IfGt(_)
        | IfLe(_) | IfNull(_) | IfNonNull(_) | TableSwitch { .. } | LookupSwitch { .. }
        | IReturn | FReturn | AReturn | AThrow | MonitorEnter | MonitorExit => -1,

        LALoad | DALoad => 0,

        LStore(_) | DStore(_) | LStoreW(_) | DStoreW(_) | LStore0 | LStore1 | LStore2
        | LStore3 | DStore0 | DStore1 | DStore2 | DStore3 | Pop2 | LAdd | DAdd | LSub
        | DSub | LMul | DMul | LDiv | DDiv | LRem | DRem | LAnd | LOr | LXor | IfICmpEq(_)
        | IfICmpNe(_) | IfICmpLt(_) | IfICmpGe(_) | IfICmpGt(_) | IfICmpLe(_) | IfACmpEq(_)
        | IfACmpNe(_) | LReturn | DReturn => -2,

        IAStore | FAStore | AAStore | BAStore | CAStore | SAStore | LCmp | DCmpL | DCmpG => -3,

        LAStore | DAStore => -4,

        GetStatic(field) => i32::from(pool.field_descriptor(*field)?.width()),
        PutStatic(field) => -i32::from(pool.field_descriptor(*field)?.width()),
        GetField(field) => i32::from(pool.field_descriptor(*field)?.width()) - 1,
        PutField(field) => -i32::from(pool.field_descriptor(*field)?.width()) - 1,

        InvokeVirtual(method) | InvokeSpecial(method) => {
            let descriptor = pool.method_descriptor(*method)?;
            i32::from(descriptor.return_width()) - i32::from(descriptor.parameter_length(true))
        }
        InvokeInterface { method, .. } => {
            let descriptor = pool.method_descriptor(*method)?;
            i32::from(descriptor.return_width()) - i32::from(descriptor.parameter_length(true))
        }
        InvokeStatic(method) | InvokeDynamic(method) => {
            let descriptor = pool.method_descriptor(*method)?;
            i32::from(descriptor.return_width()) - i32::from(descriptor.parameter_length(false))
        }

        MultiANewArray { dimensions, .. } => 1 - i32::from(*dimensions),
    };
    Ok(delta)
}
