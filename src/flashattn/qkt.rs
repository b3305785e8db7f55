use crate::error::EmitError;
use crate::flashattn::Stage;
use crate::isa::asm::AsmBuf;
use crate::isa::regfile::RegPool;
use crate::isa::{check_imm, HbmReg, GP_ZERO};

const COMPONENT: &str = "qkt_multiply";

/// Prefetches one K tile and issues the batched transpose-multiply for a
/// whole GQA group. Prefill produces `[group, MLEN, MLEN]` S blocks, decode
/// `[group, MLEN, 1]`, written back to back from `s_base_address`.
///
/// The K prefetch is contiguous (`stride_en = 0`): strided prefetch requires
/// 64-element alignment that small head rows violate. `scale_en = 1` applies
/// the scale register programmed by the KV-prefetch reset.
#[allow(clippy::too_many_arguments)]
pub fn qkt_multiply(
    buf: &mut AsmBuf,
    d: usize,
    stage: Stage,
    pool: &RegPool,
    q_base_address: usize,
    k_base_hbm_reg: HbmReg,
    q_head_index: usize,
    k_head_index: usize,
    s_base_address: usize,
) -> Result<(), EmitError> {
    let gp = pool.gp(2, COMPONENT)?;
    let q_base = gp[0];
    let k_base = gp[1];
    // The Q operand is consumed once the multiply issues, so its register
    // doubles as the S write pointer.
    let s_base = q_base;

    let q_imm = check_imm(q_base_address + q_head_index * d, "q_base_address", COMPONENT)?;
    let k_imm = check_imm(k_head_index * d, "k_hbm_offset", COMPONENT)?;
    let s_imm = check_imm(s_base_address, "s_base_address", COMPONENT)?;

    buf.comment("qkt per kv head");
    buf.addi(q_base, GP_ZERO, q_imm);
    buf.addi(k_base, GP_ZERO, k_imm);
    buf.h_prefetch_m(GP_ZERO, k_base, k_base_hbm_reg, false, true);

    match stage {
        Stage::Prefill => {
            buf.m_btmm(0, q_base, GP_ZERO);
            buf.addi(s_base, GP_ZERO, s_imm);
            buf.m_bmm_wo(s_base);
        }
        Stage::Decode => {
            buf.m_btmv(0, q_base, GP_ZERO);
            buf.addi(s_base, GP_ZERO, s_imm);
            buf.m_bmv_wo(s_base);
        }
    }
    Ok(())
}
