//! Method body writer
//!
//! [`MethodWriter`] turns a sequence of emission calls, one per opcode
//! family, into the bytecode of a single method. While emitting it tracks
//! the operand stack relative to the start of the current basic block and
//! records the control-flow edges leaving the block; [`MethodWriter::finish`]
//! turns those into an absolute max stack and, if any forward branch
//! overflowed its 16-bit offset, runs the resizer before handing back a
//! [`MethodCode`].

use std::collections::HashMap;

use super::attribute::{pc_u16, ExceptionTableEntry, LineNumberEntry, LocalVarEntry, MethodCode};
use super::byte_vector::ByteVector;
use super::constpool::{LdcConstant, SymbolResolver};
use super::decode::switch_padding;
use super::descriptor::{argument_and_return_sizes, field_size};
use super::flag;
use super::label::{Label, Labels};
use super::max_stack::resolve_max_stack;
use super::opcodes::{self, InsnKind};
use super::resize::{self, ResizePlan};
use crate::common::config::Config;
use crate::common::error::{Error, Result};

/// Highest slot addressable with the `wide` prefix
const MAX_LOCAL_INDEX: u32 = u16::MAX as u32;

/// `newarray` element type codes, `T_BOOLEAN..=T_LONG`
const NEWARRAY_TYPES: std::ops::RangeInclusive<i32> = 4..=11;

#[derive(Debug, Clone, Copy)]
struct Handler {
    start: Label,
    end: Label,
    handler: Label,
    catch_type: u16,
}

/// Variable scope recorded against raw offsets; moved by the resizer
#[derive(Debug, Clone, Copy)]
struct LocalScope {
    start: usize,
    end: usize,
    name_index: u16,
    descriptor_index: u16,
    index: u16,
}

pub struct MethodWriter<'a, R: SymbolResolver + ?Sized> {
    symbols: &'a mut R,
    config: Config,
    code: ByteVector,
    labels: Labels,
    entry: Label,

    /// Block being emitted; `None` after an unconditional transfer until the
    /// next label is placed
    current_block: Option<Label>,
    /// Stack size relative to the start of the current block
    stack_size: i32,
    /// Highest `stack_size` seen in the current block
    max_relative: i32,
    max_locals: u32,
    explicit_maxs: Option<(u16, u16)>,

    /// Short forward branches whose offset overflowed, by branch offset
    far_jumps: HashMap<usize, i32>,

    handlers: Vec<Handler>,
    line_numbers: Vec<(usize, u16)>,
    local_variables: Vec<LocalScope>,
    local_variable_types: Vec<LocalScope>,
}

impl<'a, R: SymbolResolver + ?Sized> MethodWriter<'a, R> {
    /// Writer for a method with the given access flags and descriptor. The
    /// initial max locals covers the receiver (unless static) and arguments.
    pub fn new(symbols: &'a mut R, access: u16, descriptor: &str, config: Config) -> Result<Self> {
        let sizes = argument_and_return_sizes(descriptor)?;
        let mut max_locals = sizes.args as u32;
        if flag::is_static(access) {
            max_locals -= 1;
        } else {
            sizes.check_instance(descriptor)?;
        }

        let mut labels = Labels::new();
        let mut code = ByteVector::with_capacity(64);
        let entry = labels.new_label();
        labels.place(entry, 0, &mut code)?;

        Ok(Self {
            symbols,
            config,
            code,
            labels,
            entry,
            current_block: Some(entry),
            stack_size: 0,
            max_relative: 0,
            max_locals,
            explicit_maxs: None,
            far_jumps: HashMap::new(),
            handlers: Vec::new(),
            line_numbers: Vec::new(),
            local_variables: Vec::new(),
            local_variable_types: Vec::new(),
        })
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.new_label()
    }

    /// Current code length, i.e. the offset of the next instruction
    pub fn offset(&self) -> usize {
        self.code.len()
    }

    /// Stack size relative to the start of the current block
    pub fn stack_size(&self) -> i32 {
        self.stack_size
    }

    pub fn max_locals(&self) -> u32 {
        self.max_locals
    }

    /// Offset of a placed label, before any resizing
    pub fn label_position(&self, label: Label) -> Result<Option<usize>> {
        self.labels.position(label)
    }

    // ========================================================================
    // STACK AND BLOCK TRACKING
    // ========================================================================

    fn tracking(&self) -> bool {
        self.config.compute_maxs && self.current_block.is_some()
    }

    fn adjust_stack(&mut self, delta: i32) {
        if self.tracking() {
            self.stack_size += delta;
            self.max_relative = self.max_relative.max(self.stack_size);
        }
    }

    fn add_successor(&mut self, stack_size: i32, target: Label) -> Result<()> {
        if !self.config.compute_maxs {
            return Ok(());
        }
        match self.current_block {
            Some(block) => self.labels.add_edge(block, target, stack_size),
            None => Ok(()),
        }
    }

    /// Close the current block; nothing falls through to the next instruction
    fn end_block(&mut self) -> Result<()> {
        if let Some(block) = self.current_block.take() {
            self.labels.node_mut(block)?.block.max_relative = self.max_relative;
        }
        Ok(())
    }

    fn note_local(&mut self, slots_end: u32) {
        self.max_locals = self.max_locals.max(slots_end);
    }

    fn trace(&self, pc: usize, op: u8) {
        if self.config.debug_code {
            log::debug!("emit@{} stack={}: {}", pc, self.stack_size, opcodes::mnemonic(op));
        }
    }

    fn expect_kind(op: u8, family: &'static str, accepted: impl Fn(u8) -> bool) -> Result<()> {
        if accepted(op) {
            Ok(())
        } else {
            Err(Error::InvalidOpcode { opcode: op, family })
        }
    }

    // ========================================================================
    // INSTRUCTION FAMILIES
    // ========================================================================

    /// Instruction without operands (`iadd`, `dup`, `ireturn`, ...)
    pub fn emit_insn(&mut self, op: u8) -> Result<()> {
        Self::expect_kind(op, "a no-operand instruction", |op| opcodes::kind(op) == InsnKind::NoArg)?;
        let pc = self.code.len();
        self.code.put1(op);
        self.adjust_stack(opcodes::stack_effect(op));
        self.trace(pc, op);
        if opcodes::is_block_terminator(op) {
            self.end_block()?;
        }
        Ok(())
    }

    /// `bipush`, `sipush` or `newarray` with its immediate
    pub fn emit_int_insn(&mut self, op: u8, operand: i32) -> Result<()> {
        let pc = self.code.len();
        match op {
            opcodes::BIPUSH => {
                let value = i8::try_from(operand).map_err(|_| Error::operand_out_of_range(operand, "a signed byte"))?;
                self.code.put11(op, value as u8);
            }
            opcodes::SIPUSH => {
                let value = i16::try_from(operand).map_err(|_| Error::operand_out_of_range(operand, "a signed short"))?;
                self.code.put1(op).put_i16(value);
            }
            opcodes::NEWARRAY => {
                if !NEWARRAY_TYPES.contains(&operand) {
                    return Err(Error::operand_out_of_range(operand, "a newarray type code"));
                }
                self.code.put11(op, operand as u8);
            }
            _ => return Err(Error::InvalidOpcode { opcode: op, family: "an integer-operand instruction" }),
        }
        self.adjust_stack(opcodes::stack_effect(op));
        self.trace(pc, op);
        Ok(())
    }

    /// Push an int literal with `bipush` or `sipush`
    pub fn push_int(&mut self, value: i32) -> Result<()> {
        if i8::try_from(value).is_ok() {
            self.emit_int_insn(opcodes::BIPUSH, value)
        } else if i16::try_from(value).is_ok() {
            self.emit_int_insn(opcodes::SIPUSH, value)
        } else {
            Err(Error::operand_out_of_range(value, "a signed short"))
        }
    }

    /// Load, store or `ret` of local slot `var`, in the shortest encoding
    pub fn emit_var_insn(&mut self, op: u8, var: u32) -> Result<()> {
        Self::expect_kind(op, "a local-variable instruction", |op| {
            matches!(op, opcodes::ILOAD..=opcodes::ALOAD | opcodes::ISTORE..=opcodes::ASTORE | opcodes::RET)
        })?;
        if var > MAX_LOCAL_INDEX {
            return Err(Error::LocalIndexOutOfRange { index: var });
        }

        let pc = self.code.len();
        if var < 4 && op != opcodes::RET {
            let compact = if op < opcodes::ISTORE {
                opcodes::ILOAD_0 + ((op - opcodes::ILOAD) << 2) + var as u8
            } else {
                opcodes::ISTORE_0 + ((op - opcodes::ISTORE) << 2) + var as u8
            };
            self.code.put1(compact);
        } else if var >= 256 {
            self.code.put1(opcodes::WIDE).put12(op, var as u16);
        } else {
            self.code.put11(op, var as u8);
        }

        self.note_local(var + opcodes::var_slot_size(op));
        if op == opcodes::RET {
            self.trace(pc, op);
            return self.end_block();
        }
        self.adjust_stack(opcodes::stack_effect(op));
        self.trace(pc, op);
        Ok(())
    }

    /// `new`, `anewarray`, `checkcast` or `instanceof` on an internal class name
    pub fn emit_type_insn(&mut self, op: u8, internal_name: &str) -> Result<()> {
        Self::expect_kind(op, "a type instruction", |op| opcodes::kind(op) == InsnKind::Type)?;
        let index = self.symbols.class(internal_name)?;
        let pc = self.code.len();
        self.code.put12(op, index);
        self.adjust_stack(opcodes::stack_effect(op));
        self.trace(pc, op);
        Ok(())
    }

    /// `getstatic`, `putstatic`, `getfield` or `putfield`
    pub fn emit_field_insn(&mut self, op: u8, owner: &str, name: &str, descriptor: &str) -> Result<()> {
        Self::expect_kind(op, "a field instruction", |op| {
            matches!(op, opcodes::GETSTATIC..=opcodes::PUTFIELD)
        })?;
        let size = field_size(descriptor)? as i32;
        let index = self.symbols.field(owner, name, descriptor)?.index;
        let pc = self.code.len();
        self.code.put12(op, index);
        let delta = match op {
            opcodes::GETSTATIC => size,
            opcodes::PUTSTATIC => -size,
            opcodes::GETFIELD => size - 1,
            _ => -size - 1,
        };
        self.adjust_stack(delta);
        self.trace(pc, op);
        Ok(())
    }

    /// `invokevirtual`, `invokespecial`, `invokestatic` or `invokeinterface`
    pub fn emit_method_insn(&mut self, op: u8, owner: &str, name: &str, descriptor: &str) -> Result<()> {
        Self::expect_kind(op, "a method instruction", |op| {
            matches!(op, opcodes::INVOKEVIRTUAL..=opcodes::INVOKEINTERFACE)
        })?;
        let interface = op == opcodes::INVOKEINTERFACE;
        let member = self.symbols.method(owner, name, descriptor, interface)?;
        let mut sizes = member.arg_sizes()?;
        if op != opcodes::INVOKESTATIC {
            sizes = sizes.check_instance(descriptor)?;
        }
        let index = member.index;

        let pc = self.code.len();
        self.code.put12(op, index);
        if interface {
            self.code.put11(sizes.args as u8, 0);
        }
        self.adjust_stack(sizes.invoke_effect(op == opcodes::INVOKESTATIC));
        self.trace(pc, op);
        Ok(())
    }

    /// Branch to `label`. A placed label more than 32768 bytes back gets the
    /// long form right away; forward branches start short and are widened by
    /// the resizer if needed.
    pub fn emit_jump(&mut self, op: u8, label: Label) -> Result<()> {
        let kind = opcodes::kind(op);
        Self::expect_kind(op, "a jump instruction", |_| {
            matches!(kind, InsnKind::Jump | InsnKind::JumpWide)
        })?;
        let target = self.labels.position(label)?;

        if self.tracking() {
            match op {
                opcodes::GOTO | opcodes::GOTO_W => {
                    self.add_successor(self.stack_size, label)?;
                    self.end_block()?;
                }
                // the subroutine starts with the return address pushed
                opcodes::JSR | opcodes::JSR_W => self.add_successor(self.stack_size + 1, label)?,
                _ => {
                    self.adjust_stack(opcodes::stack_effect(op));
                    self.add_successor(self.stack_size, label)?;
                }
            }
        }

        let source = self.code.len();
        let out_of_range = target.map_or(false, |pos| (pos as i64 - source as i64) < i16::MIN as i64);
        if kind == InsnKind::Jump && out_of_range {
            if let Some(wide) = opcodes::widen_unconditional(op) {
                self.code.put1(wide);
                self.labels.add_reference(label, source, &mut self.code, true)?;
            } else {
                let inverted = opcodes::negate(op).ok_or(Error::InvalidOpcode { opcode: op, family: "a conditional jump" })?;
                self.code.put1(inverted).put_i16(8).put1(opcodes::GOTO_W);
                let goto_pc = self.code.len() - 1;
                self.labels.add_reference(label, goto_pc, &mut self.code, true)?;
            }
        } else {
            self.code.put1(op);
            self.labels.add_reference(label, source, &mut self.code, kind == InsnKind::JumpWide)?;
        }
        self.trace(source, op);
        Ok(())
    }

    /// Place `label` at the current offset and start a new block there
    pub fn place_label(&mut self, label: Label) -> Result<()> {
        let position = self.code.len();
        let far = self.labels.place(label, position, &mut self.code)?;
        for jump in far {
            log::trace!("branch at {} overflows 16 bits (offset {})", jump.source, jump.offset);
            self.far_jumps.insert(jump.source, jump.offset);
        }

        if self.config.compute_maxs {
            if self.current_block.is_some() {
                self.add_successor(self.stack_size, label)?;
                self.end_block()?;
            }
            self.current_block = Some(label);
            self.stack_size = 0;
            self.max_relative = 0;
        }
        Ok(())
    }

    /// `ldc`, `ldc_w` or `ldc2_w`, whichever the constant needs
    pub fn emit_ldc(&mut self, constant: &LdcConstant) -> Result<()> {
        let item = self.symbols.constant(constant)?;
        let pc = self.code.len();
        let op = if item.wide {
            opcodes::LDC2_W
        } else if item.index >= 256 {
            opcodes::LDC_W
        } else {
            opcodes::LDC
        };
        if op == opcodes::LDC {
            self.code.put11(op, item.index as u8);
        } else {
            self.code.put12(op, item.index);
        }
        self.adjust_stack(opcodes::stack_effect(op));
        self.trace(pc, op);
        Ok(())
    }

    /// `iinc`, with the `wide` prefix when slot or increment need it
    pub fn emit_iinc(&mut self, var: u32, increment: i32) -> Result<()> {
        if var > MAX_LOCAL_INDEX {
            return Err(Error::LocalIndexOutOfRange { index: var });
        }
        let increment16 =
            i16::try_from(increment).map_err(|_| Error::operand_out_of_range(increment, "a signed short"))?;
        let pc = self.code.len();
        if var > 255 || i8::try_from(increment).is_err() {
            self.code.put1(opcodes::WIDE).put12(opcodes::IINC, var as u16).put_i16(increment16);
        } else {
            self.code.put11(opcodes::IINC, var as u8).put1(increment as i8 as u8);
        }
        self.note_local(var + 1);
        self.trace(pc, opcodes::IINC);
        Ok(())
    }

    fn switch_prologue(&mut self, default: Label, targets: &[Label]) -> Result<()> {
        if self.tracking() {
            self.adjust_stack(-1);
            self.add_successor(self.stack_size, default)?;
            for &target in targets {
                self.add_successor(self.stack_size, target)?;
            }
            self.end_block()?;
        }
        Ok(())
    }

    /// `tableswitch` over `min..=max`; `targets[i]` handles key `min + i`
    pub fn emit_table_switch(&mut self, min: i32, max: i32, default: Label, targets: &[Label]) -> Result<()> {
        let expected = max as i64 - min as i64 + 1;
        if expected < 1 || targets.len() as i64 != expected {
            return Err(Error::operand_out_of_range(targets.len() as i64, "the tableswitch key range"));
        }
        self.switch_prologue(default, targets)?;

        let source = self.code.len();
        self.code.put1(opcodes::TABLESWITCH).put_zeros(switch_padding(source));
        self.labels.add_reference(default, source, &mut self.code, true)?;
        self.code.put_i32(min).put_i32(max);
        for &target in targets {
            self.labels.add_reference(target, source, &mut self.code, true)?;
        }
        self.trace(source, opcodes::TABLESWITCH);
        Ok(())
    }

    /// `lookupswitch` matching `keys[i]` to `targets[i]`
    pub fn emit_lookup_switch(&mut self, default: Label, keys: &[i32], targets: &[Label]) -> Result<()> {
        if keys.len() != targets.len() {
            return Err(Error::operand_out_of_range(targets.len() as i64, "the lookupswitch key count"));
        }
        self.switch_prologue(default, targets)?;

        let source = self.code.len();
        self.code.put1(opcodes::LOOKUPSWITCH).put_zeros(switch_padding(source));
        self.labels.add_reference(default, source, &mut self.code, true)?;
        self.code.put_i32(keys.len() as i32);
        for (&key, &target) in keys.iter().zip(targets) {
            self.code.put_i32(key);
            self.labels.add_reference(target, source, &mut self.code, true)?;
        }
        self.trace(source, opcodes::LOOKUPSWITCH);
        Ok(())
    }

    /// `multianewarray` of array type `descriptor` popping `dims` counts
    pub fn emit_multi_anew_array(&mut self, descriptor: &str, dims: u8) -> Result<()> {
        if dims == 0 {
            return Err(Error::operand_out_of_range(0, "a dimension count of at least 1"));
        }
        let index = self.symbols.class(descriptor)?;
        let pc = self.code.len();
        self.code.put12(opcodes::MULTIANEWARRAY, index).put1(dims);
        self.adjust_stack(1 - dims as i32);
        self.trace(pc, opcodes::MULTIANEWARRAY);
        Ok(())
    }

    // ========================================================================
    // SIDE TABLES
    // ========================================================================

    /// Protect `[start, end)` with `handler`; `None` catches everything
    pub fn add_exception_handler(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> Result<()> {
        for label in [start, end, handler] {
            self.labels.node(label)?;
        }
        let catch_type = match catch_type {
            Some(name) => self.symbols.class(name)?,
            None => 0,
        };
        self.handlers.push(Handler { start, end, handler, catch_type });
        Ok(())
    }

    /// Scope of local `index` between two placed labels; a generic
    /// `signature` also adds a LocalVariableTypeTable row
    pub fn add_local_variable(
        &mut self,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
        start: Label,
        end: Label,
        index: u32,
    ) -> Result<()> {
        let start = self.labels.resolved(start)?;
        let end = self.labels.resolved(end)?;
        let index = u16::try_from(index).map_err(|_| Error::LocalIndexOutOfRange { index })?;
        let name_index = self.symbols.utf8(name)?;
        let descriptor_index = self.symbols.utf8(descriptor)?;
        self.local_variables.push(LocalScope { start, end, name_index, descriptor_index, index });
        if let Some(signature) = signature {
            let signature_index = self.symbols.utf8(signature)?;
            self.local_variable_types.push(LocalScope {
                start,
                end,
                name_index,
                descriptor_index: signature_index,
                index,
            });
        }
        Ok(())
    }

    /// Source `line` starts at placed label `start`
    pub fn add_line_number(&mut self, line: u16, start: Label) -> Result<()> {
        let start = self.labels.resolved(start)?;
        self.line_numbers.push((start, line));
        Ok(())
    }

    /// Explicit maxima, used when `compute_maxs` is off
    pub fn set_maxs(&mut self, max_stack: u16, max_locals: u16) {
        self.explicit_maxs = Some((max_stack, max_locals));
    }

    // ========================================================================
    // FINISH
    // ========================================================================

    fn compute_maxs(&mut self) -> Result<(u16, u16)> {
        if !self.config.compute_maxs {
            if let Some(maxs) = self.explicit_maxs {
                return Ok(maxs);
            }
            let max_locals =
                u16::try_from(self.max_locals).map_err(|_| Error::TooManyLocals { count: self.max_locals })?;
            return Ok((0, max_locals));
        }
        let mut roots = vec![(self.entry, 0)];
        roots.extend(self.handlers.iter().map(|h| (h.handler, 1)));
        let depth = resolve_max_stack(&mut self.labels, &roots)?;
        let max_stack = u16::try_from(depth).map_err(|_| Error::MaxStackOverflow { depth: depth as i64 })?;
        let max_locals =
            u16::try_from(self.max_locals).map_err(|_| Error::TooManyLocals { count: self.max_locals })?;
        Ok((max_stack, max_locals))
    }

    fn local_entries(scopes: &[LocalScope], plan: &ResizePlan) -> Result<Vec<LocalVarEntry>> {
        scopes
            .iter()
            .map(|scope| {
                let start = plan.remap(scope.start)?;
                let end = plan.remap(scope.end)?;
                Ok(LocalVarEntry {
                    start_pc: pc_u16(start)?,
                    length: pc_u16(end.saturating_sub(start))?,
                    name_index: scope.name_index,
                    descriptor_index: scope.descriptor_index,
                    index: scope.index,
                })
            })
            .collect()
    }

    /// Check every label is placed, compute the maxima, resize if needed and
    /// return the finished body
    pub fn finish(mut self) -> Result<MethodCode> {
        if let Some(label) = self.labels.first_unresolved() {
            return Err(Error::UnresolvedLabel { label: label.index() });
        }
        for handler in &self.handlers {
            for label in [handler.start, handler.end, handler.handler] {
                self.labels.resolved(label)?;
            }
        }
        self.end_block()?;

        let (max_stack, max_locals) = self.compute_maxs()?;

        let (code, plan) = if self.far_jumps.is_empty() {
            (self.code.into_vec(), ResizePlan::default())
        } else {
            let original = self.code.into_vec();
            let plan = resize::plan(&original, &self.far_jumps, self.config.max_resize_passes)?;
            let resized = resize::apply(&original, &self.far_jumps, &plan)?;
            self.labels.remap_positions(|pos| plan.remap(pos))?;
            (resized, plan)
        };

        let mut exception_table = Vec::with_capacity(self.handlers.len());
        for h in &self.handlers {
            exception_table.push(ExceptionTableEntry {
                start_pc: pc_u16(self.labels.resolved(h.start)?)?,
                end_pc: pc_u16(self.labels.resolved(h.end)?)?,
                handler_pc: pc_u16(self.labels.resolved(h.handler)?)?,
                catch_type: h.catch_type,
            });
        }
        let line_numbers = self
            .line_numbers
            .iter()
            .map(|&(start, line)| {
                Ok(LineNumberEntry {
                    start_pc: pc_u16(plan.remap(start)?)?,
                    line_number: line,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let local_variables = Self::local_entries(&self.local_variables, &plan)?;
        let local_variable_types = Self::local_entries(&self.local_variable_types, &plan)?;

        log::debug!(
            "method code: {} bytes, max_stack={}, max_locals={}, resize passes={}",
            code.len(),
            max_stack,
            max_locals,
            plan.passes
        );

        Ok(MethodCode {
            code,
            max_stack,
            max_locals,
            exception_table,
            line_numbers,
            local_variables,
            local_variable_types,
            resizes: plan.entries,
            resize_passes: plan.passes,
            labels: self.labels,
        })
    }
}
