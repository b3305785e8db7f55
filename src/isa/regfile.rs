use crate::error::EmitError;
use crate::isa::asm::AsmBuf;
use crate::isa::{check_imm, Fp, Gp, FP_ZERO, GP_ZERO};

/// Caller-owned pool of currently-free register indices. There is no
/// allocator: each emitter draws a prefix slice scoped to one call, and the
/// conceptual "reset" between sub-emitters is the next prefix acquisition
/// plus an emitted register wipe. Nothing is ever consumed from the pool,
/// which keeps the emitted text stable under refactoring.
#[derive(Debug, Clone)]
pub struct RegPool {
    int: Vec<Gp>,
    fp: Vec<Fp>,
}

impl RegPool {
    pub fn new(free_int: &[u8], free_fp: &[u8]) -> Self {
        Self {
            int: free_int.iter().map(|&r| Gp(r)).collect(),
            fp: free_fp.iter().map(|&r| Fp(r)).collect(),
        }
    }

    /// The first `needed` free integer registers.
    pub fn gp(&self, needed: usize, component: &'static str) -> Result<&[Gp], EmitError> {
        if self.int.len() < needed {
            return Err(EmitError::RegisterStarvation {
                component,
                kind: "int",
                needed,
                available: self.int.len(),
            });
        }
        Ok(&self.int[..needed])
    }

    /// The first `needed` free floating-point registers.
    pub fn fp(&self, needed: usize, component: &'static str) -> Result<&[Fp], EmitError> {
        if self.fp.len() < needed {
            return Err(EmitError::RegisterStarvation {
                component,
                kind: "fp",
                needed,
                available: self.fp.len(),
            });
        }
        Ok(&self.fp[..needed])
    }
}

/// Zeroes the first `count` pool GP registers so stale address arithmetic
/// never leaks across component boundaries.
pub fn reset_gp_regs(
    buf: &mut AsmBuf,
    pool: &RegPool,
    count: usize,
    component: &'static str,
) -> Result<(), EmitError> {
    for &r in pool.gp(count, component)? {
        buf.addi(r, GP_ZERO, 0);
    }
    Ok(())
}

/// Zeroes the first `count` pool FP registers.
pub fn reset_fp_regs(
    buf: &mut AsmBuf,
    pool: &RegPool,
    count: usize,
    component: &'static str,
) -> Result<(), EmitError> {
    for &r in pool.fp(count, component)? {
        buf.add_fp(r, FP_ZERO, FP_ZERO);
    }
    Ok(())
}

/// Loads `mask` into the first pool GP register and latches it into the
/// vector write-mask register. Must run before every masked head pass.
pub fn set_v_mask(
    buf: &mut AsmBuf,
    pool: &RegPool,
    mask: usize,
    component: &'static str,
) -> Result<(), EmitError> {
    let r = pool.gp(1, component)?[0];
    buf.addi(r, GP_ZERO, check_imm(mask, "v_mask", component)?);
    buf.set_v_mask_reg(r);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn prefix_acquisition_does_not_consume() {
        let pool = RegPool::new(&[1, 2, 3, 4, 5, 6], &[1, 2, 3, 4, 5]);
        let a = pool.gp(6, "test").unwrap();
        let b = pool.gp(2, "test").unwrap();
        assert_eq!(a[0], b[0]);
        assert_eq!(a[1], b[1]);
    }

    #[test]
    fn starvation_reports_demand() {
        let pool = RegPool::new(&[1, 2], &[1]);
        let err = pool.gp(6, "online_softmax").unwrap_err();
        assert_eq!(
            err,
            EmitError::RegisterStarvation {
                component: "online_softmax",
                kind: "int",
                needed: 6,
                available: 2,
            }
        );
        assert!(pool.fp(5, "online_softmax").is_err());
    }

    #[test]
    fn register_wipes() {
        let pool = RegPool::new(&[3, 4], &[2]);
        let mut buf = AsmBuf::new();
        reset_gp_regs(&mut buf, &pool, 2, "test").unwrap();
        reset_fp_regs(&mut buf, &pool, 1, "test").unwrap();
        assert_eq!(
            buf.text(),
            "S_ADDI_INT gp3, gp0, 0\n\
             S_ADDI_INT gp4, gp0, 0\n\
             S_ADD_FP f2, f0, f0\n"
        );
    }

    #[test]
    fn v_mask_latch() {
        let pool = RegPool::new(&[7], &[]);
        let mut buf = AsmBuf::new();
        set_v_mask(&mut buf, &pool, 1 << 3, "test").unwrap();
        assert_eq!(
            buf.text(),
            "S_ADDI_INT gp7, gp0, 8\nC_SET_V_MASK_REG gp7\n"
        );
    }
}
