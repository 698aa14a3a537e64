//! The dispatch loop.
//!
//! `execute` is one interpreter activation: it installs a jump link, runs
//! the opcode loop, and funnels every raise through the catch trampoline.
//! Foreign functions re-enter through the foreign-call API, creating
//! another activation on the same stack; `ReturnFromVm` is what hands an
//! activation back to whoever started it.

use std::rc::Rc;

use ivy_asm::{Opcode, RUNTIME_ERROR_ID};
use tracing::trace;

use crate::error::{OpResult, Raise};
use crate::interpreter::Vm;
use crate::raiser::CatchEntry;
use crate::value::{FunctionBody, Value};

/// Apply a sign-extended word offset to an instruction position.
pub(crate) fn offset_pc(pc: usize, word: u16) -> usize {
    pc.wrapping_add_signed(word as i16 as isize)
}

impl Vm {
    /// Run the current frame until its activation returns.
    pub(crate) fn execute(&mut self) -> OpResult<()> {
        let link = self.raiser.enter_link();
        let result = self.trampoline();
        self.raiser.leave_link(link);
        result
    }

    /// The catch trampoline: resume dispatch after every caught raise,
    /// hand uncaught ones to the caller.
    fn trampoline(&mut self) -> OpResult<()> {
        loop {
            match self.dispatch() {
                Ok(()) => return Ok(()),
                Err(raise) => {
                    if !self.catch_exception() {
                        return Err(raise);
                    }
                }
            }
        }
    }

    fn dispatch(&mut self) -> OpResult<()> {
        let mut code = self.cur().code.clone();
        let mut pc = self.cur().pc;

        loop {
            let op = Opcode::try_from(code[pc]).map_err(|bad| {
                self.error(
                    RUNTIME_ERROR_ID,
                    format!("Invalid opcode word {:#06x}.", bad.0),
                )
            })?;
            let line = code[pc + 1];

            {
                let frame = self.cur_mut();
                frame.pc = pc;
                frame.line = line;
            }

            trace!(%op, pc, line, "dispatch");

            match op {
                Opcode::FastAssign | Opcode::Assign => {
                    let value = self.local_cloned(code[pc + 2]);
                    self.set_local(code[pc + 3], value);
                    pc += 4;
                }
                Opcode::GetReadonly => {
                    let value = self.readonly[code[pc + 2] as usize].clone();
                    self.set_local(code[pc + 3], value);
                    pc += 4;
                }
                Opcode::GetInteger => {
                    let imm = code[pc + 2] as i16 as i64;
                    self.set_local(code[pc + 3], Value::Integer(imm));
                    pc += 4;
                }
                Opcode::GetBoolean => {
                    self.set_local(code[pc + 3], Value::Boolean(code[pc + 2] != 0));
                    pc += 4;
                }
                Opcode::GetByte => {
                    self.set_local(code[pc + 3], Value::Byte(code[pc + 2] as u8));
                    pc += 4;
                }
                Opcode::GetEmptyVariant => {
                    self.set_local(code[pc + 3], Value::EmptyVariant(code[pc + 2]));
                    pc += 4;
                }
                Opcode::GetGlobal => {
                    let value = self.regs[code[pc + 2] as usize].clone();
                    self.set_local(code[pc + 3], value);
                    pc += 4;
                }
                Opcode::SetGlobal => {
                    let value = self.local_cloned(code[pc + 2]);
                    self.regs[code[pc + 3] as usize] = value;
                    pc += 4;
                }

                Opcode::IntegerAdd
                | Opcode::IntegerMinus
                | Opcode::IntegerMul
                | Opcode::IntegerDiv
                | Opcode::IntegerModulo
                | Opcode::IntegerShl
                | Opcode::IntegerShr
                | Opcode::IntegerAnd
                | Opcode::IntegerOr
                | Opcode::IntegerXor
                | Opcode::DoubleAdd
                | Opcode::DoubleMinus
                | Opcode::DoubleMul
                | Opcode::DoubleDiv
                | Opcode::Less
                | Opcode::LessEq
                | Opcode::Greater
                | Opcode::GreaterEq
                | Opcode::IsEqual
                | Opcode::NotEq => {
                    self.binary_op(op, code[pc + 2], code[pc + 3], code[pc + 4])?;
                    pc += 5;
                }
                Opcode::UnaryNot | Opcode::UnaryMinus => {
                    self.unary_op(op, code[pc + 2], code[pc + 3]);
                    pc += 4;
                }

                Opcode::Jump => {
                    pc = offset_pc(pc, code[pc + 2]);
                }
                Opcode::JumpIf => {
                    let sense = code[pc + 2] != 0;
                    if self.local(code[pc + 3]).is_truthy() == sense {
                        pc = offset_pc(pc, code[pc + 4]);
                    } else {
                        pc += 5;
                    }
                }
                Opcode::ForSetup => {
                    self.for_setup(&code[pc..])?;
                    pc += 6;
                }
                Opcode::IntegerFor => {
                    pc = self.integer_for(&code[pc..], pc);
                }
                Opcode::MatchDispatch => {
                    pc = self.match_dispatch(&code[pc..], pc);
                }

                Opcode::GetItem => {
                    self.op_get_item(&code[pc..])?;
                    pc += 5;
                }
                Opcode::SetItem => {
                    self.op_set_item(&code[pc..])?;
                    pc += 5;
                }
                Opcode::GetProperty => {
                    self.op_get_property(&code[pc..]);
                    pc += 5;
                }
                Opcode::SetProperty => {
                    self.op_set_property(&code[pc..]);
                    pc += 5;
                }

                Opcode::BuildList | Opcode::BuildTuple => {
                    self.op_build_list_tuple(op, &code[pc..]);
                    pc += 4 + code[pc + 2] as usize;
                }
                Opcode::BuildHash => {
                    self.op_build_hash(&code[pc..]);
                    pc += 5 + code[pc + 3] as usize;
                }
                Opcode::BuildEnum => {
                    self.op_build_enum(&code[pc..]);
                    pc += 5 + code[pc + 3] as usize;
                }
                Opcode::VariantDecompose => {
                    self.op_variant_decompose(&code[pc..]);
                    pc += 4 + code[pc + 3] as usize;
                }
                Opcode::Interpolation => {
                    self.op_interpolation(&code[pc..]);
                    pc += 4 + code[pc + 2] as usize;
                }
                Opcode::DynamicCast => {
                    self.op_dynamic_cast(&code[pc..]);
                    pc += 5;
                }
                Opcode::NewInstanceBasic
                | Opcode::NewInstanceSpeculative
                | Opcode::NewInstanceTagged => {
                    self.op_new_instance(op, &code[pc..]);
                    pc += 4;
                }

                Opcode::NativeCall | Opcode::ForeignCall | Opcode::FunctionCall => {
                    let argc = code[pc + 3] as usize;
                    let ret = code[pc + 4];
                    let args = code[pc + 5..pc + 5 + argc].to_vec();
                    let resume = pc + 5 + argc;

                    let callee = self.call_target(op, code[pc + 2])?;
                    self.cur_mut().pc = resume;

                    if callee.code().is_some() {
                        self.enter_native(callee, &args, ret)?;
                        code = self.cur().code.clone();
                        pc = 0;
                    } else {
                        self.enter_foreign(callee, &args, ret)?;
                        pc = resume;
                    }
                }
                Opcode::ReturnUnit | Opcode::ReturnVal => {
                    let value = if op == Opcode::ReturnVal {
                        self.local_cloned(code[pc + 2])
                    } else {
                        Value::Unit
                    };

                    if let Some(target) = self.cur().return_target {
                        self.regs[target] = value;
                    }

                    self.frame -= 1;
                    code = self.cur().code.clone();
                    pc = self.cur().pc;
                }

                Opcode::CreateClosure => {
                    self.op_create_closure(&code[pc..]);
                    pc += 4;
                }
                Opcode::LoadClosure => {
                    self.op_load_closure(&code[pc..]);
                    pc += 4 + code[pc + 2] as usize;
                }
                Opcode::LoadClassClosure => {
                    self.op_load_class_closure(&code[pc..]);
                    pc += 5;
                }
                Opcode::CreateFunction => {
                    self.op_create_function(&code[pc..]);
                    pc += 5;
                }
                Opcode::GetUpvalue => {
                    let value = self.upvalue_get(code[pc + 2]);
                    self.set_local(code[pc + 3], value);
                    pc += 4;
                }
                Opcode::SetUpvalue => {
                    let value = self.local_cloned(code[pc + 3]);
                    self.upvalue_set(code[pc + 2], value);
                    pc += 4;
                }

                Opcode::PushTry => {
                    let entry = CatchEntry {
                        frame: self.frame,
                        link: self.raiser.current_link(),
                        except_pos: offset_pc(pc, code[pc + 2]),
                    };

                    self.raiser.catches.push(entry);
                    pc += 3;
                }
                Opcode::PopTry => {
                    self.raiser.catches.pop();
                    pc += 2;
                }
                // Handler chains are only entered through the catch
                // machinery, which resumes past the matched clause; an
                // except instruction reached in sequence is a skip.
                Opcode::ExceptCatch | Opcode::ExceptIgnore => {
                    pc += 5;
                }
                Opcode::Raise => {
                    let value = self.local_cloned(code[pc + 2]);
                    return Err(self.raise_value(value));
                }

                Opcode::ReturnFromVm => {
                    self.cur_mut().pc = pc;
                    return Ok(());
                }
            }
        }
    }

    /// Resolve what a call opcode is invoking.
    fn call_target(&mut self, op: Opcode, operand: u16) -> Result<Rc<FunctionBody>, Raise> {
        let value = match op {
            Opcode::FunctionCall => self.local_cloned(operand),
            _ => self.readonly[operand as usize].clone(),
        };

        match value {
            Value::Function(body) => Ok(body),
            other => {
                let class = self.class_name(other.class_id());
                Err(self.error(
                    RUNTIME_ERROR_ID,
                    format!("Cannot call a value of class {class}."),
                ))
            }
        }
    }
}
