//! Calls, returns, and loop stepping.

use std::rc::Rc;

use ivy_asm::{RUNTIME_ERROR_ID, VALUE_ERROR_ID};

use crate::call::CallFrame;
use crate::consts::CALL_DEPTH_LIMIT;
use crate::error::OpResult;
use crate::interpreter::alu::integer;
use crate::interpreter::executors::offset_pc;
use crate::interpreter::Vm;
use crate::value::{FunctionBody, FunctionKind, Value};

impl Vm {
    /// Build the callee's frame: claim a register window above the
    /// caller's top, copy the argument registers in, and clear whatever
    /// else the callee asked for.
    fn setup_call(
        &mut self,
        callee: Rc<FunctionBody>,
        args: &[u16],
        ret: u16,
        foreign: bool,
    ) -> OpResult<()> {
        if self.frame > CALL_DEPTH_LIMIT {
            return Err(self.error(
                RUNTIME_ERROR_ID,
                "Function call recursion limit reached.",
            ));
        }

        let caller_base = self.cur().base;
        let base = self.cur().top;
        let regs_used = if foreign {
            args.len()
        } else {
            callee.reg_count()
        };

        let need = base + regs_used;
        if need > self.regs.len() {
            self.grow_registers(need + 1);
        }

        for (i, arg) in args.iter().enumerate() {
            let value = self.regs[caller_base + *arg as usize].clone();
            self.regs[base + i] = value;
        }

        for slot in &mut self.regs[base + args.len()..base + regs_used] {
            *slot = Value::Unit;
        }

        let return_target = Some(caller_base + ret as usize);
        let next = self.frame + 1;

        if next == self.frames.len() {
            self.frames.push(CallFrame::new(callee, base, regs_used));
            let frame = &mut self.frames[next];
            frame.return_target = return_target;
        } else {
            let code = callee.code().unwrap_or_else(|| Vec::new().into());
            let frame = &mut self.frames[next];
            frame.function = callee;
            frame.code = code;
            frame.pc = 0;
            frame.line = 0;
            frame.base = base;
            frame.regs_used = regs_used;
            frame.top = base + regs_used;
            frame.return_target = return_target;
            frame.closure = None;
        }

        self.frame = next;
        Ok(())
    }

    /// Enter a native callee; dispatch continues in the new frame.
    pub(crate) fn enter_native(
        &mut self,
        callee: Rc<FunctionBody>,
        args: &[u16],
        ret: u16,
    ) -> OpResult<()> {
        self.setup_call(callee, args, ret, false)
    }

    /// Invoke a foreign callee directly and pop its frame, without running
    /// the dispatch loop. A raise leaves the frame in place so the
    /// traceback shows the foreign call.
    pub(crate) fn enter_foreign(
        &mut self,
        callee: Rc<FunctionBody>,
        args: &[u16],
        ret: u16,
    ) -> OpResult<()> {
        let func = match &callee.kind {
            FunctionKind::Foreign(func) => *func,
            FunctionKind::Native(_) => unreachable!("enter_foreign on a native function"),
        };

        self.setup_call(callee, args, ret, true)?;

        func(self)?;

        self.frame -= 1;
        Ok(())
    }

    /// `for_setup start, stop, step, loop`: validate the step and bias the
    /// counters one step back, so the first `integer_for` lands on the
    /// start value.
    pub(crate) fn for_setup(&mut self, code: &[u16]) -> OpResult<()> {
        let start = integer(self.local(code[2]));
        let step = integer(self.local(code[4]));

        if step == 0 {
            return Err(self.error(VALUE_ERROR_ID, "for loop step cannot be 0."));
        }

        let primed = start.wrapping_sub(step);
        self.set_local(code[5], Value::Integer(primed));
        self.set_local(code[2], Value::Integer(primed));

        Ok(())
    }

    /// `integer_for loop, stop, step, ext, offset`: bump the internal
    /// counter and mirror it into the user's register, or exit the loop.
    /// The internal counter keeps user assignments from damaging the loop.
    pub(crate) fn integer_for(&mut self, code: &[u16], pc: usize) -> usize {
        let current = integer(self.local(code[2]));
        let stop = integer(self.local(code[3]));
        let step = integer(self.local(code[4]));

        let next = current.wrapping_add(step);
        let keep_going = if step > 0 { next <= stop } else { next >= stop };

        if keep_going {
            self.set_local(code[2], Value::Integer(next));
            self.set_local(code[5], Value::Integer(next));
            pc + 7
        } else {
            offset_pc(pc, code[6])
        }
    }

    /// `match_dispatch src, base, count, offsets…`: the emitter writes the
    /// jump table in variant order and guarantees exhaustiveness, so the
    /// variant's distance from the base enum id indexes it directly.
    pub(crate) fn match_dispatch(&mut self, code: &[u16], pc: usize) -> usize {
        let variant_class = self.local(code[2]).class_id();
        let selected = (variant_class - code[3]) as usize;

        offset_pc(pc, code[5 + selected])
    }
}
