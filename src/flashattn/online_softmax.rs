use crate::error::EmitError;
use crate::flashattn::Stage;
use crate::isa::asm::AsmBuf;
use crate::isa::regfile::RegPool;
use crate::isa::{check_imm, Fp, Gp, FP_ZERO, GP_ZERO};

const COMPONENT: &str = "online_softmax";

/// Register assignment for one softmax row. The FP-SRAM triple pointers
/// advance by one slot per row, S by one row of `MLEN`.
struct RowRegs {
    s_addr: Gp,
    m_addr: Gp,
    m_res_addr: Gp,
    l_addr: Gp,
    m_last: Fp,
    l_old: Fp,
    m_tmp: Fp,
    sum_p: Fp,
    qk_scale: Fp,
}

/// The per-row recurrence, emitted exactly once. Prefill wraps it in the
/// hardware row loop, decode uses it bare.
///
/// m_curr = max(S_row * qk_scale, m_last)
/// m_res  = exp(m_last - m_curr)
/// P_row  = exp(S_row - m_curr)           (in place, S becomes P)
/// l      = l * m_res + sum(P_row)
fn softmax_row(buf: &mut AsmBuf, r: &RowRegs) {
    buf.v_mul_vf(r.s_addr, r.s_addr, r.qk_scale, false);

    // m_last is already in scaled space from previous tiles, or the -inf
    // sentinel on the first one.
    buf.ld_fp(r.m_last, r.m_addr, 0);
    buf.add_fp(r.m_tmp, r.m_last, FP_ZERO);

    // The reduce overwrites the stale max; the copy in m_tmp survives.
    let m_curr = r.m_last;
    buf.v_red_max(m_curr, r.s_addr);

    let m_res = r.m_tmp;
    buf.sub_fp(m_res, r.m_tmp, m_curr);
    buf.exp_fp(m_res, m_res);
    buf.st_fp(m_res, r.m_res_addr, 0);
    buf.st_fp(m_curr, r.m_addr, 0);

    buf.v_sub_vf(r.s_addr, r.s_addr, m_curr, false);
    buf.v_exp_v(r.s_addr, r.s_addr, false);

    buf.ld_fp(r.l_old, r.l_addr, 0);
    buf.add_fp(r.sum_p, FP_ZERO, FP_ZERO);
    buf.v_red_sum(r.sum_p, r.s_addr);

    buf.mul_fp(r.l_old, r.l_old, m_res);
    let l_new = r.l_old;
    buf.add_fp(l_new, r.sum_p, r.l_old);
    buf.st_fp(l_new, r.l_addr, 0);
}

/// Emits the numerically-stable online softmax for one Q head inside a
/// K-tile. Reads the head's S block in place and leaves P there; maintains
/// the `(m, m_res, l)` triple at `m_start_address` with per-head stride
/// `3 * br`. The O accumulation that follows must use the `m_res` stored
/// here.
#[allow(clippy::too_many_arguments)]
pub fn online_softmax(
    buf: &mut AsmBuf,
    mlen: usize,
    br: usize,
    stage: Stage,
    pool: &RegPool,
    s_address: usize,
    m_start_address: usize,
    qk_scale_address: usize,
) -> Result<(), EmitError> {
    let gp = pool.gp(5, COMPONENT)?;
    let fp = pool.fp(5, COMPONENT)?;
    let loop_reg = gp[4];
    let regs = RowRegs {
        s_addr: gp[0],
        m_addr: gp[1],
        m_res_addr: gp[2],
        l_addr: gp[3],
        m_last: fp[0],
        l_old: fp[1],
        m_tmp: fp[2],
        sum_p: fp[3],
        qk_scale: fp[4],
    };

    let s_imm = check_imm(s_address, "s_address", COMPONENT)?;
    let m_imm = check_imm(m_start_address, "m_start_address", COMPONENT)?;
    let br_imm = check_imm(br, "row_state_stride", COMPONENT)?;
    let scale_imm = check_imm(qk_scale_address, "qk_scale_address", COMPONENT)?;

    buf.comment("online softmax");
    buf.addi(regs.s_addr, GP_ZERO, s_imm);
    buf.addi(regs.m_addr, GP_ZERO, m_imm);
    buf.addi(regs.m_res_addr, regs.m_addr, br_imm);
    buf.addi(regs.l_addr, regs.m_res_addr, br_imm);
    buf.ld_fp(regs.qk_scale, GP_ZERO, scale_imm);

    match stage {
        Stage::Prefill => {
            buf.loop_start(loop_reg, br as u32);
            softmax_row(buf, &regs);
            buf.addi(regs.s_addr, regs.s_addr, mlen as u32);
            buf.addi(regs.m_addr, regs.m_addr, 1);
            buf.addi(regs.m_res_addr, regs.m_res_addr, 1);
            buf.addi(regs.l_addr, regs.l_addr, 1);
            buf.loop_end(loop_reg);
        }
        Stage::Decode => softmax_row(buf, &regs),
    }
    Ok(())
}
