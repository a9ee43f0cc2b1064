//! Decoded guest instruction records.

use std::fmt;

use crate::reg::GuestReg;

/// Coarse operation class, used by the block builder to decide
/// where a block ends and by the histogram to know which operand
/// fields are live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpClass {
    /// Conditional compare-and-branch (B-type).
    Branch,
    /// JAL / JALR.
    Jump,
    /// Register-immediate ALU (I-type).
    Immediate,
    /// Register-register ALU (R-type).
    Register,
    /// LUI / AUIPC.
    UpperImmediate,
    Load,
    Store,
    /// LR/SC/AMO.
    Atomic,
    /// FENCE / FENCE.I.
    Fence,
    /// ECALL / EBREAK.
    System,
    /// Zicsr.
    Csr,
    /// F/D extension. `rs1`/`rd` are set only where the operand is
    /// an integer register (load/store base, conversions, moves,
    /// compares); float register numbers stay in `raw`.
    Float,
    /// Word that does not decode to any known instruction.
    Invalid,
}

macro_rules! mnemonics {
    ($($variant:ident => $name:literal,)*) => {
        /// Guest operation tag.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Mnemonic {
            $($variant,)*
        }

        impl Mnemonic {
            /// Assembler spelling.
            pub const fn name(self) -> &'static str {
                match self {
                    $(Mnemonic::$variant => $name,)*
                }
            }
        }
    };
}

mnemonics! {
    Lui => "lui",
    Auipc => "auipc",
    Jal => "jal",
    Jalr => "jalr",
    Beq => "beq",
    Bne => "bne",
    Blt => "blt",
    Bge => "bge",
    Bltu => "bltu",
    Bgeu => "bgeu",
    Lb => "lb",
    Lh => "lh",
    Lw => "lw",
    Ld => "ld",
    Lbu => "lbu",
    Lhu => "lhu",
    Lwu => "lwu",
    Sb => "sb",
    Sh => "sh",
    Sw => "sw",
    Sd => "sd",
    Addi => "addi",
    Slti => "slti",
    Sltiu => "sltiu",
    Xori => "xori",
    Ori => "ori",
    Andi => "andi",
    Slli => "slli",
    Srli => "srli",
    Srai => "srai",
    Add => "add",
    Sub => "sub",
    Sll => "sll",
    Slt => "slt",
    Sltu => "sltu",
    Xor => "xor",
    Srl => "srl",
    Sra => "sra",
    Or => "or",
    And => "and",
    Addiw => "addiw",
    Slliw => "slliw",
    Srliw => "srliw",
    Sraiw => "sraiw",
    Addw => "addw",
    Subw => "subw",
    Sllw => "sllw",
    Srlw => "srlw",
    Sraw => "sraw",
    Fence => "fence",
    FenceI => "fence.i",
    Ecall => "ecall",
    Ebreak => "ebreak",
    Csrrw => "csrrw",
    Csrrs => "csrrs",
    Csrrc => "csrrc",
    Csrrwi => "csrrwi",
    Csrrsi => "csrrsi",
    Csrrci => "csrrci",
    Mul => "mul",
    Mulh => "mulh",
    Mulhsu => "mulhsu",
    Mulhu => "mulhu",
    Div => "div",
    Divu => "divu",
    Rem => "rem",
    Remu => "remu",
    Mulw => "mulw",
    Divw => "divw",
    Divuw => "divuw",
    Remw => "remw",
    Remuw => "remuw",
    LrW => "lr.w",
    ScW => "sc.w",
    AmoswapW => "amoswap.w",
    AmoaddW => "amoadd.w",
    AmoxorW => "amoxor.w",
    AmoandW => "amoand.w",
    AmoorW => "amoor.w",
    AmominW => "amomin.w",
    AmomaxW => "amomax.w",
    AmominuW => "amominu.w",
    AmomaxuW => "amomaxu.w",
    LrD => "lr.d",
    ScD => "sc.d",
    AmoswapD => "amoswap.d",
    AmoaddD => "amoadd.d",
    AmoxorD => "amoxor.d",
    AmoandD => "amoand.d",
    AmoorD => "amoor.d",
    AmominD => "amomin.d",
    AmomaxD => "amomax.d",
    AmominuD => "amominu.d",
    AmomaxuD => "amomaxu.d",
    Flw => "flw",
    Fsw => "fsw",
    Fld => "fld",
    Fsd => "fsd",
    FmaddS => "fmadd.s",
    FmsubS => "fmsub.s",
    FnmsubS => "fnmsub.s",
    FnmaddS => "fnmadd.s",
    FaddS => "fadd.s",
    FsubS => "fsub.s",
    FmulS => "fmul.s",
    FdivS => "fdiv.s",
    FsqrtS => "fsqrt.s",
    FsgnjS => "fsgnj.s",
    FsgnjnS => "fsgnjn.s",
    FsgnjxS => "fsgnjx.s",
    FminS => "fmin.s",
    FmaxS => "fmax.s",
    FcvtWS => "fcvt.w.s",
    FcvtWuS => "fcvt.wu.s",
    FcvtLS => "fcvt.l.s",
    FcvtLuS => "fcvt.lu.s",
    FcvtSW => "fcvt.s.w",
    FcvtSWu => "fcvt.s.wu",
    FcvtSL => "fcvt.s.l",
    FcvtSLu => "fcvt.s.lu",
    FeqS => "feq.s",
    FltS => "flt.s",
    FleS => "fle.s",
    FclassS => "fclass.s",
    FmaddD => "fmadd.d",
    FmsubD => "fmsub.d",
    FnmsubD => "fnmsub.d",
    FnmaddD => "fnmadd.d",
    FaddD => "fadd.d",
    FsubD => "fsub.d",
    FmulD => "fmul.d",
    FdivD => "fdiv.d",
    FsqrtD => "fsqrt.d",
    FsgnjD => "fsgnj.d",
    FsgnjnD => "fsgnjn.d",
    FsgnjxD => "fsgnjx.d",
    FminD => "fmin.d",
    FmaxD => "fmax.d",
    FcvtWD => "fcvt.w.d",
    FcvtWuD => "fcvt.wu.d",
    FcvtLD => "fcvt.l.d",
    FcvtLuD => "fcvt.lu.d",
    FcvtDW => "fcvt.d.w",
    FcvtDWu => "fcvt.d.wu",
    FcvtDL => "fcvt.d.l",
    FcvtDLu => "fcvt.d.lu",
    FeqD => "feq.d",
    FltD => "flt.d",
    FleD => "fle.d",
    FclassD => "fclass.d",
    FmvXW => "fmv.x.w",
    FmvWX => "fmv.w.x",
    FmvXD => "fmv.x.d",
    FmvDX => "fmv.d.x",
    FcvtSD => "fcvt.s.d",
    FcvtDS => "fcvt.d.s",
    Link => "link",
    Invalid => "<invalid>",
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One decoded guest instruction.
///
/// Operand fields an instruction does not use are left as `x0`,
/// so histogram and allocator code can treat every field uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuestInstruction {
    /// Guest address of the instruction.
    pub addr: u64,
    pub mnem: Mnemonic,
    pub class: OpClass,
    pub rs1: GuestReg,
    pub rs2: GuestReg,
    pub rd: GuestReg,
    /// Sign-extended immediate (branch/jump offsets in bytes,
    /// upper immediates already shifted, CSR number for Zicsr).
    pub imm: i64,
    /// Raw instruction word.
    pub raw: u32,
}

impl GuestInstruction {
    /// Instruction with every operand field cleared.
    pub const fn new(addr: u64, mnem: Mnemonic, class: OpClass, raw: u32) -> Self {
        Self {
            addr,
            mnem,
            class,
            rs1: GuestReg::ZERO,
            rs2: GuestReg::ZERO,
            rd: GuestReg::ZERO,
            imm: 0,
            raw,
        }
    }

    /// Address of the sequentially next instruction.
    #[inline]
    pub const fn next_addr(&self) -> u64 {
        self.addr.wrapping_add(4)
    }

    /// Target of a direct jump or branch.
    #[inline]
    pub const fn target(&self) -> u64 {
        self.addr.wrapping_add(self.imm as u64)
    }

    /// Register operands read by this instruction (x0 excluded).
    pub fn sources(&self) -> impl Iterator<Item = GuestReg> {
        let (a, b) = match self.class {
            OpClass::Register | OpClass::Atomic | OpClass::Branch | OpClass::Store => {
                (self.rs1, self.rs2)
            }
            // Float leaves rs1 at x0 unless the operand is an integer register.
            OpClass::Immediate | OpClass::Load | OpClass::Csr | OpClass::Float => {
                (self.rs1, GuestReg::ZERO)
            }
            OpClass::Jump if self.mnem == Mnemonic::Jalr => (self.rs1, GuestReg::ZERO),
            _ => (GuestReg::ZERO, GuestReg::ZERO),
        };
        [a, b].into_iter().filter(|r| !r.is_zero())
    }

    /// Register written by this instruction, if any (never x0).
    pub fn dest(&self) -> Option<GuestReg> {
        let writes = matches!(
            self.class,
            OpClass::Register
                | OpClass::Immediate
                | OpClass::UpperImmediate
                | OpClass::Load
                | OpClass::Atomic
                | OpClass::Jump
                | OpClass::Csr
                | OpClass::Float
        );
        (writes && !self.rd.is_zero()).then_some(self.rd)
    }

    /// Every register operand reference, reads first.
    pub fn operands(&self) -> impl Iterator<Item = GuestReg> {
        self.sources().chain(self.dest())
    }

    /// Rewrite an inlined direct JAL into its link-only form:
    /// `rd := addr + 4` with no displacement left to jump.
    pub fn make_link_only(&mut self) {
        debug_assert_eq!(self.mnem, Mnemonic::Jal);
        self.mnem = Mnemonic::Link;
        self.class = OpClass::UpperImmediate;
        self.rs1 = GuestReg::ZERO;
        self.rs2 = GuestReg::ZERO;
        self.imm = 4;
    }

    /// A call site: a jump that links through `ra` or `t0`.
    pub fn is_call(&self) -> bool {
        matches!(self.mnem, Mnemonic::Jal | Mnemonic::Jalr | Mnemonic::Link) && self.rd.is_link()
    }

    /// A return site: `jalr x0, 0(ra|t0)`.
    pub fn is_return(&self) -> bool {
        self.mnem == Mnemonic::Jalr && self.rd.is_zero() && self.rs1.is_link()
    }
}

impl fmt::Display for GuestInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}: {}", self.addr, self.mnem)?;
        let (rd, rs1, rs2, imm) = (self.rd, self.rs1, self.rs2, self.imm);
        match self.class {
            OpClass::Register | OpClass::Atomic => write!(f, " {rd}, {rs1}, {rs2}"),
            OpClass::Immediate => write!(f, " {rd}, {rs1}, {imm}"),
            OpClass::Load => write!(f, " {rd}, {imm}({rs1})"),
            OpClass::Store => write!(f, " {rs2}, {imm}({rs1})"),
            OpClass::Branch => write!(f, " {rs1}, {rs2}, {:#x}", self.target()),
            OpClass::UpperImmediate => write!(f, " {rd}, {:#x}", imm),
            OpClass::Jump if self.mnem == Mnemonic::Jal => {
                write!(f, " {rd}, {:#x}", self.target())
            }
            OpClass::Jump => write!(f, " {rd}, {imm}({rs1})"),
            OpClass::Csr => write!(f, " {rd}, {:#x}, {rs1}", imm & 0xfff),
            OpClass::Fence | OpClass::System => Ok(()),
            OpClass::Float => {
                let field = |shift: u32| (self.raw >> shift) & 0x1f;
                let (fd, fs1, fs2) = (field(7), field(15), field(20));
                match self.mnem {
                    Mnemonic::Flw | Mnemonic::Fld => write!(f, " f{fd}, {imm}({rs1})"),
                    Mnemonic::Fsw | Mnemonic::Fsd => write!(f, " f{fs2}, {imm}({rs1})"),
                    _ if !rd.is_zero() => write!(f, " {rd}, f{fs1}, f{fs2}"),
                    _ if !rs1.is_zero() => write!(f, " f{fd}, {rs1}"),
                    _ => write!(f, " f{fd}, f{fs1}, f{fs2}"),
                }
            }
            OpClass::Invalid => write!(f, " ({:#010x})", self.raw),
        }
    }
}
