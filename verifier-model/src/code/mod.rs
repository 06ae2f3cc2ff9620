pub mod instruction;
pub mod types;

pub use instruction::Instruction;
use instruction::InstructionIndex;

/// One entry of a method's exception table. `catch_type` is `None` for a catch-all/`finally`
/// handler (class-file `exceptionClassIndex == 0`); `SPEC_FULL.md` §4.7 and §9 require that this
/// be treated as `java/lang/Throwable` by callers, logged rather than silently normalized away,
/// so the zero case is preserved here rather than resolved eagerly.
#[derive(Debug, Clone, Copy)]
pub struct ExceptionEntry {
    pub start_pc: InstructionIndex,
    pub end_pc: InstructionIndex,
    pub handler_pc: InstructionIndex,
    pub catch_type: Option<crate::id::ClassId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum VerifyCodeExceptionError {
    /// `start_pc >= end_pc`
    InverseOrder,
    InvalidStartIndex,
    InvalidEndIndex,
    InvalidHandlerIndex,
    /// A `<init>` method's protected range contains a `return` without a matching `athrow`,
    /// which the JVM spec forbids (a constructor must not return normally past code that might
    /// leave `this` uninitialized on the exceptional path).
    IllegalInstructions,
}

/// A method's decoded body: the instruction stream, its exception table, and its declared frame
/// capacity. This is the "parsed method" the pipeline diagram in `SPEC_FULL.md` §2 starts from —
/// constructed directly by whatever sits above the core (the external, out-of-scope class-file
/// reader), never parsed from raw bytes here.
#[derive(Debug, Clone)]
pub struct CodeInfo {
    instructions: Vec<(InstructionIndex, Instruction)>,
    max_locals: u16,
    max_stack: u16,
    exception_table: Vec<ExceptionEntry>,
}
impl CodeInfo {
    #[must_use]
    pub fn new(
        instructions: Vec<(InstructionIndex, Instruction)>,
        max_locals: u16,
        max_stack: u16,
        exception_table: Vec<ExceptionEntry>,
    ) -> Self {
        Self {
            instructions,
            max_locals,
            max_stack,
            exception_table,
        }
    }

    #[must_use]
    pub fn instructions(&self) -> &[(InstructionIndex, Instruction)] {
        &self.instructions
    }

    #[must_use]
    pub fn max_locals(&self) -> u16 {
        self.max_locals
    }

    #[must_use]
    pub fn max_stack(&self) -> u16 {
        self.max_stack
    }

    #[must_use]
    pub fn exception_table(&self) -> &[ExceptionEntry] {
        &self.exception_table
    }

    fn instruction_index_of(&self, idx: InstructionIndex) -> Option<usize> {
        self.instructions.binary_search_by_key(&idx, |(i, _)| *i).ok()
    }

    #[must_use]
    pub fn has_instruction_at(&self, idx: InstructionIndex) -> bool {
        self.instruction_index_of(idx).is_some()
    }

    #[must_use]
    pub fn get_instruction_at(&self, idx: InstructionIndex) -> Option<&Instruction> {
        self.instruction_index_of(idx).map(|i| &self.instructions[i].1)
    }

    /// One past the last instruction's PC: the code length in bytecode-offset terms (here, just
    /// the count of decoded instructions' index space, since sizes are implicit in the pre-parsed
    /// instruction stream rather than real byte widths).
    #[must_use]
    pub fn end_index(&self) -> InstructionIndex {
        self.instructions
            .last()
            .map_or(InstructionIndex(0), |(idx, _)| InstructionIndex(idx.0 + 1))
    }

    /// Validity checks independent of which method owns this code: `start < end`, all three PCs
    /// land on real instruction boundaries.
    ///
    /// Grounded on `rhojvm-base::code::CodeInfo::check_exception_basic`.
    pub fn check_exception_basic(&self, exc: &ExceptionEntry) -> Result<(), VerifyCodeExceptionError> {
        if exc.start_pc >= exc.end_pc {
            return Err(VerifyCodeExceptionError::InverseOrder);
        }

        if !self.has_instruction_at(exc.start_pc) {
            return Err(VerifyCodeExceptionError::InvalidStartIndex);
        }

        if exc.end_pc != self.end_index() && !self.has_instruction_at(exc.end_pc) {
            return Err(VerifyCodeExceptionError::InvalidEndIndex);
        }

        if !self.has_instruction_at(exc.handler_pc) {
            return Err(VerifyCodeExceptionError::InvalidHandlerIndex);
        }

        Ok(())
    }

    /// Full exception-table validity, including the `<init>`-specific rule that a protected range
    /// containing a bare `return` (rather than only falling out via `athrow`) is illegal — it
    /// would let a constructor complete normally having left `this` uninitialized on some path.
    ///
    /// Grounded on `rhojvm-base::code::CodeInfo::check_exception`.
    pub fn check_exception(
        &self,
        is_init_method: bool,
        exc: &ExceptionEntry,
    ) -> Result<(), VerifyCodeExceptionError> {
        self.check_exception_basic(exc)?;

        if is_init_method {
            let in_range = |idx: InstructionIndex| idx >= exc.start_pc && idx < exc.end_pc;
            let has_return = self
                .instructions
                .iter()
                .any(|(idx, inst)| in_range(*idx) && matches!(inst, Instruction::Return(_)));
            if has_return {
                let has_athrow = self
                    .instructions
                    .iter()
                    .any(|(idx, inst)| in_range(*idx) && matches!(inst, Instruction::AThrow));
                if !has_athrow {
                    return Err(VerifyCodeExceptionError::IllegalInstructions);
                }
            }
        }

        Ok(())
    }
}
