//! F/D arithmetic, conversions and compares.
//!
//! Operands arrive as raw register bits. Single-precision values live
//! NaN-boxed in the 64-bit registers: an operand whose upper half is
//! not all ones reads as the canonical NaN. Every helper runs its
//! operation under the guest rounding mode and folds the host
//! exception flags into `fflags`.

use std::hint::black_box;
use std::num::FpCategory;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::os::raw::c_int;

use dbt_core::RegisterFile;

#[link(name = "m")]
extern "C" {
    fn feclearexcept(excepts: c_int) -> c_int;
    fn fegetround() -> c_int;
    fn fesetround(round: c_int) -> c_int;
    fn fetestexcept(excepts: c_int) -> c_int;
}

// x86-64 glibc values.
const FE_INVALID: c_int = 0x01;
const FE_DIVBYZERO: c_int = 0x04;
const FE_OVERFLOW: c_int = 0x08;
const FE_UNDERFLOW: c_int = 0x10;
const FE_INEXACT: c_int = 0x20;
const FE_ALL_EXCEPT: c_int = 0x3d;

const FE_TONEAREST: c_int = 0x000;
const FE_DOWNWARD: c_int = 0x400;
const FE_UPWARD: c_int = 0x800;
const FE_TOWARDZERO: c_int = 0xc00;

pub const FFLAGS_NX: u64 = 1 << 0;
pub const FFLAGS_UF: u64 = 1 << 1;
pub const FFLAGS_OF: u64 = 1 << 2;
pub const FFLAGS_DZ: u64 = 1 << 3;
pub const FFLAGS_NV: u64 = 1 << 4;
pub const FFLAGS_MASK: u64 = 0x1f;

/// `frm` position inside `fcsr`.
pub const FRM_SHIFT: u32 = 5;
pub const FRM_MASK: u64 = 0x7;

/// Rounding-mode field value that defers to `frm`.
const RM_DYN: u64 = 7;

/// Upper half of a NaN-boxed single.
pub const NAN_BOX: u64 = 0xffff_ffff_0000_0000;

/// Every FP helper: register file, up to three operands, and the
/// instruction's rounding-mode field.
pub type FpHelper =
    unsafe extern "C" fn(regs: *mut RegisterFile, a: u64, b: u64, c: u64, rm: u64) -> u64;

// ── Formats ───────────────────────────────────────────────────

trait Float:
    Copy
    + PartialEq
    + PartialOrd
    + Neg<Output = Self>
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
{
    const SIGN: u64;
    const QUIET: u64;
    const CANONICAL_NAN: u64;

    fn from_reg(reg: u64) -> Self;
    fn to_reg(self) -> u64;
    fn bits(self) -> u64;
    fn from_raw_bits(bits: u64) -> Self;
    fn is_nan(self) -> bool;
    fn category(self) -> FpCategory;
    fn fused(self, b: Self, c: Self) -> Self;
    fn root(self) -> Self;
    fn widen(self) -> f64;
    fn narrow(x: f64) -> Self;
    fn from_i64(x: i64) -> Self;
    fn from_u64(x: u64) -> Self;

    fn is_snan(self) -> bool {
        self.is_nan() && self.bits() & Self::QUIET == 0
    }

    fn is_negative(self) -> bool {
        self.bits() & Self::SIGN != 0
    }

    /// Register bits of the result, NaNs canonicalized.
    fn result(self) -> u64 {
        if self.is_nan() {
            Self::from_raw_bits(Self::CANONICAL_NAN).to_reg()
        } else {
            self.to_reg()
        }
    }
}

impl Float for f32 {
    const SIGN: u64 = 1 << 31;
    const QUIET: u64 = 1 << 22;
    const CANONICAL_NAN: u64 = 0x7fc0_0000;

    fn from_reg(reg: u64) -> Self {
        if reg & NAN_BOX == NAN_BOX {
            f32::from_bits(reg as u32)
        } else {
            f32::from_bits(Self::CANONICAL_NAN as u32)
        }
    }
    fn to_reg(self) -> u64 {
        NAN_BOX | self.to_bits() as u64
    }
    fn bits(self) -> u64 {
        self.to_bits() as u64
    }
    fn from_raw_bits(bits: u64) -> Self {
        f32::from_bits(bits as u32)
    }
    fn is_nan(self) -> bool {
        f32::is_nan(self)
    }
    fn category(self) -> FpCategory {
        self.classify()
    }
    fn fused(self, b: Self, c: Self) -> Self {
        self.mul_add(b, c)
    }
    fn root(self) -> Self {
        self.sqrt()
    }
    fn widen(self) -> f64 {
        self as f64
    }
    fn narrow(x: f64) -> Self {
        x as f32
    }
    fn from_i64(x: i64) -> Self {
        x as f32
    }
    fn from_u64(x: u64) -> Self {
        x as f32
    }
}

impl Float for f64 {
    const SIGN: u64 = 1 << 63;
    const QUIET: u64 = 1 << 51;
    const CANONICAL_NAN: u64 = 0x7ff8_0000_0000_0000;

    fn from_reg(reg: u64) -> Self {
        f64::from_bits(reg)
    }
    fn to_reg(self) -> u64 {
        self.to_bits()
    }
    fn bits(self) -> u64 {
        self.to_bits()
    }
    fn from_raw_bits(bits: u64) -> Self {
        f64::from_bits(bits)
    }
    fn is_nan(self) -> bool {
        f64::is_nan(self)
    }
    fn category(self) -> FpCategory {
        self.classify()
    }
    fn fused(self, b: Self, c: Self) -> Self {
        self.mul_add(b, c)
    }
    fn root(self) -> Self {
        self.sqrt()
    }
    fn widen(self) -> f64 {
        self
    }
    fn narrow(x: f64) -> Self {
        x
    }
    fn from_i64(x: i64) -> Self {
        x as f64
    }
    fn from_u64(x: u64) -> Self {
        x as f64
    }
}

// ── Rounding and flags ────────────────────────────────────────

/// Guest FP state seen by one helper invocation.
struct FpEnv<'a> {
    fcsr: &'a mut u64,
    /// Effective rounding mode, `RM_DYN` resolved.
    rm: u64,
}

impl<'a> FpEnv<'a> {
    fn new(regs: &'a mut RegisterFile, rm: u64) -> Self {
        let rm = match rm & FRM_MASK {
            RM_DYN => (regs.fcsr >> FRM_SHIFT) & FRM_MASK,
            rm => rm,
        };
        Self {
            fcsr: &mut regs.fcsr,
            rm,
        }
    }

    fn raise(&mut self, flags: u64) {
        *self.fcsr |= flags & FFLAGS_MASK;
    }

    /// Host rounding mode for the guest's; reserved encodings raise
    /// NV and round to nearest.
    fn host_rounding(&mut self) -> c_int {
        match self.rm {
            0 | 4 => FE_TONEAREST,
            1 => FE_TOWARDZERO,
            2 => FE_DOWNWARD,
            3 => FE_UPWARD,
            _ => {
                self.raise(FFLAGS_NV);
                FE_TONEAREST
            }
        }
    }

    /// Run `op` under the guest rounding mode and accrue the host
    /// exceptions it raised. Operands must pass through `black_box`
    /// inside `op` so the arithmetic stays between the fenv calls.
    fn run<T>(&mut self, op: impl FnOnce() -> T) -> T {
        let mode = self.host_rounding();
        // SAFETY: fenv calls only touch this thread's FPU control state.
        let (result, raised) = unsafe {
            let saved = fegetround();
            feclearexcept(FE_ALL_EXCEPT);
            fesetround(mode);
            let result = black_box(op());
            let raised = fetestexcept(FE_ALL_EXCEPT);
            fesetround(saved);
            feclearexcept(FE_ALL_EXCEPT);
            (result, raised)
        };
        let mut flags = 0;
        for (host, guest) in [
            (FE_INEXACT, FFLAGS_NX),
            (FE_UNDERFLOW, FFLAGS_UF),
            (FE_OVERFLOW, FFLAGS_OF),
            (FE_DIVBYZERO, FFLAGS_DZ),
            (FE_INVALID, FFLAGS_NV),
        ] {
            if raised & host != 0 {
                flags |= guest;
            }
        }
        self.raise(flags);
        result
    }

    // ── Operation shapes ──────────────────────────────────────

    fn binary<F: Float>(&mut self, a: u64, b: u64, op: fn(F, F) -> F) -> u64 {
        let (x, y) = (F::from_reg(a), F::from_reg(b));
        self.run(|| op(black_box(x), black_box(y))).result()
    }

    fn fused<F: Float>(&mut self, a: u64, b: u64, c: u64, negate_product: bool, negate_addend: bool) -> u64 {
        let mut x = F::from_reg(a);
        let mut z = F::from_reg(c);
        if negate_product {
            x = -x;
        }
        if negate_addend {
            z = -z;
        }
        let y = F::from_reg(b);
        self.run(|| black_box(x).fused(black_box(y), black_box(z))).result()
    }

    fn sqrt<F: Float>(&mut self, a: u64) -> u64 {
        let x = F::from_reg(a);
        self.run(|| black_box(x).root()).result()
    }

    /// FSGNJ family: magnitude of `a`, sign from `sign(a, b)`.
    fn sign_inject<F: Float>(&mut self, a: u64, b: u64, sign: fn(bool, bool) -> bool) -> u64 {
        let (x, y) = (F::from_reg(a), F::from_reg(b));
        let negative = sign(x.is_negative(), y.is_negative());
        let magnitude = x.bits() & !F::SIGN;
        let bits = if negative { magnitude | F::SIGN } else { magnitude };
        F::from_raw_bits(bits).to_reg()
    }

    fn min_max<F: Float>(&mut self, a: u64, b: u64, max: bool) -> u64 {
        let (x, y) = (F::from_reg(a), F::from_reg(b));
        if x.is_snan() || y.is_snan() {
            self.raise(FFLAGS_NV);
        }
        let pick = match (x.is_nan(), y.is_nan()) {
            (true, true) => return F::from_raw_bits(F::CANONICAL_NAN).to_reg(),
            (true, false) => y,
            (false, true) => x,
            // -0.0 orders below +0.0.
            _ if x == y => {
                if x.is_negative() != max {
                    x
                } else {
                    y
                }
            }
            _ if (x < y) != max => x,
            _ => y,
        };
        pick.to_reg()
    }

    /// FEQ is quiet; FLT and FLE raise NV on any NaN.
    fn compare<F: Float>(&mut self, a: u64, b: u64, signaling: bool, op: fn(F, F) -> bool) -> u64 {
        let (x, y) = (F::from_reg(a), F::from_reg(b));
        if x.is_nan() || y.is_nan() {
            if signaling || x.is_snan() || y.is_snan() {
                self.raise(FFLAGS_NV);
            }
            return 0;
        }
        op(x, y) as u64
    }

    fn class<F: Float>(&mut self, a: u64) -> u64 {
        let x = F::from_reg(a);
        let bit = match (x.category(), x.is_negative()) {
            (FpCategory::Infinite, true) => 0,
            (FpCategory::Normal, true) => 1,
            (FpCategory::Subnormal, true) => 2,
            (FpCategory::Zero, true) => 3,
            (FpCategory::Zero, false) => 4,
            (FpCategory::Subnormal, false) => 5,
            (FpCategory::Normal, false) => 6,
            (FpCategory::Infinite, false) => 7,
            (FpCategory::Nan, _) if x.is_snan() => 8,
            (FpCategory::Nan, _) => 9,
        };
        1 << bit
    }

    /// Round `x` to an integer in `[lo, hi)`. Out of range or NaN
    /// raises NV and yields `None`; a rounded fraction raises NX.
    fn to_integer(&mut self, x: f64, lo: f64, hi: f64) -> Option<f64> {
        let rounded = match self.rm {
            0 => x.round_ties_even(),
            1 => x.trunc(),
            2 => x.floor(),
            3 => x.ceil(),
            4 => x.round(),
            _ => {
                self.raise(FFLAGS_NV);
                x.round_ties_even()
            }
        };
        if x.is_nan() || rounded < lo || rounded >= hi {
            self.raise(FFLAGS_NV);
            return None;
        }
        if rounded != x {
            self.raise(FFLAGS_NX);
        }
        Some(rounded)
    }

    fn to_w<F: Float>(&mut self, a: u64) -> u64 {
        let x = F::from_reg(a).widen();
        let val = match self.to_integer(x, -2_147_483_648.0, 2_147_483_648.0) {
            Some(r) => r as i32,
            None if x.is_nan() || x > 0.0 => i32::MAX,
            None => i32::MIN,
        };
        val as i64 as u64
    }

    fn to_wu<F: Float>(&mut self, a: u64) -> u64 {
        let x = F::from_reg(a).widen();
        let val = match self.to_integer(x, 0.0, 4_294_967_296.0) {
            Some(r) => r as u32,
            None if x.is_nan() || x > 0.0 => u32::MAX,
            None => 0,
        };
        // 32-bit results are sign-extended, even unsigned ones.
        val as i32 as i64 as u64
    }

    fn to_l<F: Float>(&mut self, a: u64) -> u64 {
        let x = F::from_reg(a).widen();
        let val = match self.to_integer(x, -9_223_372_036_854_775_808.0, 9_223_372_036_854_775_808.0) {
            Some(r) => r as i64,
            None if x.is_nan() || x > 0.0 => i64::MAX,
            None => i64::MIN,
        };
        val as u64
    }

    fn to_lu<F: Float>(&mut self, a: u64) -> u64 {
        let x = F::from_reg(a).widen();
        match self.to_integer(x, 0.0, 18_446_744_073_709_551_616.0) {
            Some(r) => r as u64,
            None if x.is_nan() || x > 0.0 => u64::MAX,
            None => 0,
        }
    }

    fn from_signed<F: Float>(&mut self, x: i64) -> u64 {
        self.run(|| F::from_i64(black_box(x))).result()
    }

    fn from_unsigned<F: Float>(&mut self, x: u64) -> u64 {
        self.run(|| F::from_u64(black_box(x))).result()
    }

    /// FCVT.S.D and FCVT.D.S.
    fn convert<From: Float, To: Float>(&mut self, a: u64) -> u64 {
        let x = From::from_reg(a);
        if x.is_snan() {
            self.raise(FFLAGS_NV);
        }
        let wide = x.widen();
        self.run(|| To::narrow(black_box(wide))).result()
    }
}

// ── Entry points ──────────────────────────────────────────────

macro_rules! fp_helpers {
    ($($name:ident => $op:expr;)*) => {
        $(
            /// # Safety
            /// `regs` must point to a live register file.
            pub unsafe extern "C" fn $name(
                regs: *mut RegisterFile,
                a: u64,
                b: u64,
                c: u64,
                rm: u64,
            ) -> u64 {
                let op: fn(&mut FpEnv<'_>, u64, u64, u64) -> u64 = $op;
                op(&mut FpEnv::new(&mut *regs, rm), a, b, c)
            }
        )*
    };
}

fp_helpers! {
    helper_fadd_s => |env, a, b, _| env.binary::<f32>(a, b, |x, y| x + y);
    helper_fsub_s => |env, a, b, _| env.binary::<f32>(a, b, |x, y| x - y);
    helper_fmul_s => |env, a, b, _| env.binary::<f32>(a, b, |x, y| x * y);
    helper_fdiv_s => |env, a, b, _| env.binary::<f32>(a, b, |x, y| x / y);
    helper_fsqrt_s => |env, a, _, _| env.sqrt::<f32>(a);
    helper_fmadd_s => |env, a, b, c| env.fused::<f32>(a, b, c, false, false);
    helper_fmsub_s => |env, a, b, c| env.fused::<f32>(a, b, c, false, true);
    helper_fnmsub_s => |env, a, b, c| env.fused::<f32>(a, b, c, true, false);
    helper_fnmadd_s => |env, a, b, c| env.fused::<f32>(a, b, c, true, true);
    helper_fsgnj_s => |env, a, b, _| env.sign_inject::<f32>(a, b, |_, s| s);
    helper_fsgnjn_s => |env, a, b, _| env.sign_inject::<f32>(a, b, |_, s| !s);
    helper_fsgnjx_s => |env, a, b, _| env.sign_inject::<f32>(a, b, |m, s| m ^ s);
    helper_fmin_s => |env, a, b, _| env.min_max::<f32>(a, b, false);
    helper_fmax_s => |env, a, b, _| env.min_max::<f32>(a, b, true);
    helper_feq_s => |env, a, b, _| env.compare::<f32>(a, b, false, |x, y| x == y);
    helper_flt_s => |env, a, b, _| env.compare::<f32>(a, b, true, |x, y| x < y);
    helper_fle_s => |env, a, b, _| env.compare::<f32>(a, b, true, |x, y| x <= y);
    helper_fclass_s => |env, a, _, _| env.class::<f32>(a);
    helper_fcvt_w_s => |env, a, _, _| env.to_w::<f32>(a);
    helper_fcvt_wu_s => |env, a, _, _| env.to_wu::<f32>(a);
    helper_fcvt_l_s => |env, a, _, _| env.to_l::<f32>(a);
    helper_fcvt_lu_s => |env, a, _, _| env.to_lu::<f32>(a);
    helper_fcvt_s_w => |env, a, _, _| env.from_signed::<f32>(a as i32 as i64);
    helper_fcvt_s_wu => |env, a, _, _| env.from_signed::<f32>(a as u32 as i64);
    helper_fcvt_s_l => |env, a, _, _| env.from_signed::<f32>(a as i64);
    helper_fcvt_s_lu => |env, a, _, _| env.from_unsigned::<f32>(a);
    helper_fcvt_s_d => |env, a, _, _| env.convert::<f64, f32>(a);

    helper_fadd_d => |env, a, b, _| env.binary::<f64>(a, b, |x, y| x + y);
    helper_fsub_d => |env, a, b, _| env.binary::<f64>(a, b, |x, y| x - y);
    helper_fmul_d => |env, a, b, _| env.binary::<f64>(a, b, |x, y| x * y);
    helper_fdiv_d => |env, a, b, _| env.binary::<f64>(a, b, |x, y| x / y);
    helper_fsqrt_d => |env, a, _, _| env.sqrt::<f64>(a);
    helper_fmadd_d => |env, a, b, c| env.fused::<f64>(a, b, c, false, false);
    helper_fmsub_d => |env, a, b, c| env.fused::<f64>(a, b, c, false, true);
    helper_fnmsub_d => |env, a, b, c| env.fused::<f64>(a, b, c, true, false);
    helper_fnmadd_d => |env, a, b, c| env.fused::<f64>(a, b, c, true, true);
    helper_fsgnj_d => |env, a, b, _| env.sign_inject::<f64>(a, b, |_, s| s);
    helper_fsgnjn_d => |env, a, b, _| env.sign_inject::<f64>(a, b, |_, s| !s);
    helper_fsgnjx_d => |env, a, b, _| env.sign_inject::<f64>(a, b, |m, s| m ^ s);
    helper_fmin_d => |env, a, b, _| env.min_max::<f64>(a, b, false);
    helper_fmax_d => |env, a, b, _| env.min_max::<f64>(a, b, true);
    helper_feq_d => |env, a, b, _| env.compare::<f64>(a, b, false, |x, y| x == y);
    helper_flt_d => |env, a, b, _| env.compare::<f64>(a, b, true, |x, y| x < y);
    helper_fle_d => |env, a, b, _| env.compare::<f64>(a, b, true, |x, y| x <= y);
    helper_fclass_d => |env, a, _, _| env.class::<f64>(a);
    helper_fcvt_w_d => |env, a, _, _| env.to_w::<f64>(a);
    helper_fcvt_wu_d => |env, a, _, _| env.to_wu::<f64>(a);
    helper_fcvt_l_d => |env, a, _, _| env.to_l::<f64>(a);
    helper_fcvt_lu_d => |env, a, _, _| env.to_lu::<f64>(a);
    helper_fcvt_d_w => |env, a, _, _| env.from_signed::<f64>(a as i32 as i64);
    helper_fcvt_d_wu => |env, a, _, _| env.from_signed::<f64>(a as u32 as i64);
    helper_fcvt_d_l => |env, a, _, _| env.from_signed::<f64>(a as i64);
    helper_fcvt_d_lu => |env, a, _, _| env.from_unsigned::<f64>(a);
    helper_fcvt_d_s => |env, a, _, _| env.convert::<f32, f64>(a);
}
