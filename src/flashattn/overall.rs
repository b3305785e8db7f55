use derive_more::Constructor;
use log::{debug, trace};

use crate::error::EmitError;
use crate::isa::asm::AsmBuf;
use crate::isa::regfile::{reset_fp_regs, reset_gp_regs, set_v_mask, RegPool};
use crate::isa::{check_imm, HbmReg, FP_SRAM_NEG_INF, FP_SRAM_QK_SCALE, FP_SRAM_ZERO};
use crate::utils::calculation::div_ceil;

use super::online_softmax::online_softmax;
use super::output::{computing_o, computing_row_wise_scaling};
use super::pv::computing_pv;
use super::qkt::qkt_multiply;
use super::reset::{reset_fp_sram, reset_kv_prefetch, reset_v_sram};
use super::Stage;

const COMPONENT: &str = "flash_attn_asm";

/// Absolute VSRAM bases of the operand tiles, invariant for one emission.
#[derive(Debug, Clone, Copy, Constructor)]
pub struct MemoryPlan {
    pub q_base: usize,
    pub s_base: usize,
    pub pv_base: usize,
    pub o_old_base: usize,
}

impl MemoryPlan {
    /// Lays the tiles out back to back from the VSRAM base: Q `[q_len, hq, d]`
    /// (preloaded by the collaborator), the S/P scratch of `group` MLEN^2
    /// blocks, the PV scratch of the same footprint, then the packed O rows.
    pub fn layout(
        vsram_base: usize,
        q_len: usize,
        hq: usize,
        d: usize,
        mlen: usize,
        group: usize,
    ) -> Self {
        let q_base = vsram_base;
        let s_base = q_base + q_len * hq * d;
        let pv_base = s_base + mlen * mlen * group;
        let o_old_base = pv_base + mlen * mlen * group;
        Self::new(q_base, s_base, pv_base, o_old_base)
    }

    /// Every base must fit the 18-bit immediate. Validated before any
    /// instruction is appended, so a failed emission returns no text.
    fn validate(&self) -> Result<(), EmitError> {
        check_imm(self.q_base, "q_base_address", COMPONENT)?;
        check_imm(self.s_base, "s_base_address", COMPONENT)?;
        check_imm(self.pv_base, "pv_base_address", COMPONENT)?;
        check_imm(self.o_old_base, "o_old_base_address", COMPONENT)?;
        Ok(())
    }
}

fn require_positive(value: usize, constraint: &'static str) -> Result<(), EmitError> {
    if value == 0 {
        return Err(EmitError::ShapeViolation {
            component: COMPONENT,
            constraint,
            value,
        });
    }
    Ok(())
}

/// Emits the complete flash-attention program for one GQA layer: KV heads,
/// Q-sequence tiles and K-sequence tiles fully unrolled. Each Q tile seeds
/// its softmax state and zeroed O rows once, the K-tile loop accumulates on
/// top of them through the shared QK^T and the per-head softmax / PV /
/// accumulate passes, and the masked row-wise normalization per head closes
/// the Q tile once every K tile has contributed.
///
/// The stage is derived from `q_len`; decode is `q_len == 1`. `Q` must be
/// preloaded at `vsram_base` in layout `[q_len, hq, d]`, `qk_scale` at
/// FP-SRAM slot 1, and the K/V HBM base registers programmed by the caller.
#[allow(clippy::too_many_arguments)]
pub fn flash_attn_asm(
    mlen: usize,
    vlen: usize,
    blen: usize,
    batch: usize,
    hq: usize,
    hkv: usize,
    d: usize,
    q_len: usize,
    kv_len: usize,
    free_int: &[u8],
    free_fp: &[u8],
    vsram_base: usize,
    fp_sram_start: usize,
    k_base_hbm_reg: u8,
    v_base_hbm_reg: u8,
) -> Result<String, EmitError> {
    require_positive(mlen, "MLEN must be positive")?;
    require_positive(vlen, "VLEN must be positive")?;
    require_positive(blen, "BLEN must be positive")?;
    require_positive(batch, "batch must be positive")?;
    require_positive(hq, "hq must be positive")?;
    require_positive(hkv, "hkv must be positive")?;
    require_positive(d, "head_dim must be positive")?;
    require_positive(q_len, "q_len must be positive")?;
    require_positive(kv_len, "kv_len must be positive")?;

    if d > mlen {
        return Err(EmitError::ShapeViolation {
            component: COMPONENT,
            constraint: "head_dim must be <= MLEN",
            value: d,
        });
    }
    if hq % hkv != 0 {
        return Err(EmitError::ShapeViolation {
            component: COMPONENT,
            constraint: "hq must be a multiple of hkv",
            value: hq,
        });
    }
    let group = hq / hkv;
    if blen != group {
        return Err(EmitError::ShapeViolation {
            component: COMPONENT,
            constraint: "BLEN must equal hq/hkv",
            value: blen,
        });
    }

    let pool = RegPool::new(free_int, free_fp);
    // Widest prefix demand across the sub-emitters, checked up front so a
    // starved pool fails before any text exists.
    pool.gp(6, COMPONENT)?;
    pool.fp(5, COMPONENT)?;

    let stage = Stage::for_q_len(q_len);
    let br = mlen.min(q_len);
    let bc = mlen.min(kv_len);
    let q_iters = div_ceil(q_len, mlen);
    let kv_iters = div_ceil(kv_len, mlen);

    let plan = MemoryPlan::layout(vsram_base, q_len, hq, d, mlen, group);
    plan.validate()?;
    check_imm(
        fp_sram_start + group * 3 * br,
        "fp_sram_extent",
        COMPONENT,
    )?;

    debug!(
        "flash attention plan: stage {stage}, br {br}, bc {bc}, {q_iters} q tiles, {kv_iters} k tiles, group {group}"
    );
    debug!(
        "vsram plan: q {}, s {}, pv {}, o {}",
        plan.q_base, plan.s_base, plan.pv_base, plan.o_old_base
    );

    let k_reg = HbmReg(k_base_hbm_reg);
    let v_reg = HbmReg(v_base_hbm_reg);

    let mut buf = AsmBuf::new();
    buf.comment("flash attention generation");
    reset_kv_prefetch(&mut buf, hkv, d, kv_len, batch, mlen, &pool)?;

    for kv_head_index in 0..hkv {
        for _q_tile in 0..q_iters {
            trace!("emitting {group} q heads for kv head {kv_head_index}");

            // Running max seeds from the -inf sentinel, denominators from
            // zero; the packed O rows start cleared. All three are
            // per-Q-tile state: they stay at fixed addresses across the
            // K-tile loop so every tile accumulates on top of the last.
            reset_fp_sram(
                &mut buf,
                stage,
                fp_sram_start,
                br,
                3 * br,
                group,
                FP_SRAM_NEG_INF,
                &pool,
            )?;
            reset_fp_sram(
                &mut buf,
                stage,
                fp_sram_start + 2 * br,
                br,
                3 * br,
                group,
                FP_SRAM_ZERO,
                &pool,
            )?;
            reset_v_sram(
                &mut buf,
                stage,
                plan.o_old_base,
                vlen,
                br,
                group * br,
                group,
                &pool,
            )?;

            for _k_tile in 0..kv_iters {
                // One batched QK^T feeds the whole group.
                qkt_multiply(
                    &mut buf,
                    d,
                    stage,
                    &pool,
                    plan.q_base,
                    k_reg,
                    kv_head_index * group,
                    kv_head_index,
                    plan.s_base,
                )?;
                reset_gp_regs(&mut buf, &pool, 2, COMPONENT)?;

                let mut m_head_start = fp_sram_start;
                let mut m_res_address = fp_sram_start + br;
                for inner_q_head_index in 0..group {
                    online_softmax(
                        &mut buf,
                        mlen,
                        br,
                        stage,
                        &pool,
                        plan.s_base + inner_q_head_index * br * bc,
                        m_head_start,
                        FP_SRAM_QK_SCALE,
                    )?;
                    m_head_start += 3 * br;
                    reset_fp_regs(&mut buf, &pool, 5, COMPONENT)?;
                    reset_gp_regs(&mut buf, &pool, 6, COMPONENT)?;

                    computing_pv(
                        &mut buf,
                        d,
                        blen,
                        mlen,
                        vlen,
                        br,
                        bc,
                        stage,
                        &pool,
                        plan.s_base,
                        v_reg,
                        inner_q_head_index,
                        kv_head_index,
                        plan.pv_base,
                        inner_q_head_index,
                    )?;
                    reset_gp_regs(&mut buf, &pool, 6, COMPONENT)?;

                    set_v_mask(&mut buf, &pool, 1 << inner_q_head_index, COMPONENT)?;
                    computing_o(
                        &mut buf,
                        br,
                        mlen,
                        stage,
                        &pool,
                        m_res_address,
                        plan.pv_base,
                        plan.o_old_base,
                        d,
                        hq,
                    )?;
                    m_res_address += 3 * br;
                }
            }

            // Only after the last K tile do the packed rows hold the full
            // unnormalized output; each normalization pass then selects its
            // head slot through the V-mask.
            for scale_head_index in 0..group {
                reset_gp_regs(&mut buf, &pool, 3, COMPONENT)?;
                reset_fp_regs(&mut buf, &pool, 1, COMPONENT)?;
                set_v_mask(&mut buf, &pool, 1 << scale_head_index, COMPONENT)?;
                let l_old_base = fp_sram_start + scale_head_index * 3 * br + 2 * br;
                computing_row_wise_scaling(
                    &mut buf,
                    br,
                    stage,
                    &pool,
                    plan.o_old_base,
                    l_old_base,
                    hq * d,
                    true,
                )?;
            }
        }
    }
    Ok(buf.into_text())
}
