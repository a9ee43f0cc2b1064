/// Knobs that change how blocks are formed and emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatorConfig {
    /// Upper bound on guest instructions per block.
    pub max_block_insns: u32,
    /// One guest instruction per block; direct jumps are not inlined.
    pub single_step: bool,
    /// Register allocation and the return stack. Off, every guest
    /// register lives in the register file and returns always exit.
    pub optimize: bool,
    /// Emit Return Stack push/pop code at call and return sites.
    pub return_stack: bool,
    /// A register is allocated only if its use count exceeds this.
    pub alloc_threshold: u32,
    /// How many return-target blocks may be translated eagerly
    /// while resolving a call site's host return address.
    pub eager_return_depth: u32,
    /// Translate instructions without a codec to nothing instead of
    /// failing the block.
    pub fail_silently: bool,
}

impl TranslatorConfig {
    /// Effective block length limit.
    pub fn block_limit(&self) -> u32 {
        if self.single_step {
            1
        } else {
            self.max_block_insns.max(1)
        }
    }

    /// Whether blocks get a register mapping.
    pub fn allocates_registers(&self) -> bool {
        self.optimize
    }

    /// Whether call and return sites use the return stack.
    pub fn uses_return_stack(&self) -> bool {
        self.optimize && self.return_stack
    }
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            max_block_insns: 512,
            single_step: false,
            optimize: true,
            return_stack: true,
            alloc_threshold: 2,
            eager_return_depth: 4,
            fail_silently: false,
        }
    }
}
