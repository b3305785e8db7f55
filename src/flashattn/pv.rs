use crate::error::EmitError;
use crate::flashattn::Stage;
use crate::isa::asm::AsmBuf;
use crate::isa::regfile::RegPool;
use crate::isa::{check_imm, HbmReg, GP_ZERO};

const COMPONENT: &str = "computing_pv";

/// MSRAM destination of the V prefetch. K and V share the scratch region,
/// so V must be re-prefetched on every call: the K prefetch that preceded
/// this head's softmax owns MSRAM 0 until we overwrite it.
const V_MSRAM_BASE: usize = 0;

/// Emits the V prefetch plus the block-tiled P·V multiply for one Q head,
/// writing into the head's `d`-wide slot of the packed `VLEN`-wide output
/// rows at `output_base_address + head_offset * d`.
///
/// Prefill walks `d/BLEN` column blocks, each over `MLEN/BLEN` row blocks;
/// the output pointer advances by `VLEN * BLEN` per row block so the
/// head-packed layout is preserved. Decode is a single `d/BLEN` loop of the
/// vector forms.
#[allow(clippy::too_many_arguments)]
pub fn computing_pv(
    buf: &mut AsmBuf,
    head_dim: usize,
    blen: usize,
    mlen: usize,
    vlen: usize,
    br: usize,
    bc: usize,
    stage: Stage,
    pool: &RegPool,
    p_base_address: usize,
    v_base_hbm_reg: HbmReg,
    q_head_index: usize,
    v_head_index: usize,
    output_base_address: usize,
    head_offset: usize,
) -> Result<(), EmitError> {
    let gp = pool.gp(6, COMPONENT)?;
    let p_base = gp[0];
    let v_base = gp[1];
    let out_base = gp[2];
    let outer_loop = gp[3];
    let inner_loop = gp[4];
    let out_col = gp[5];

    let p_start = p_base_address + q_head_index * br * bc;
    let out_start = output_base_address + head_offset * head_dim;
    let p_imm = check_imm(p_start, "p_base_address", COMPONENT)?;
    let v_imm = check_imm(v_head_index * head_dim, "v_hbm_offset", COMPONENT)?;
    let out_imm = check_imm(out_start, "output_base_address", COMPONENT)?;
    let v_msram_imm = check_imm(V_MSRAM_BASE, "v_msram_base", COMPONENT)?;

    buf.comment("pv per kv head (packed output)");
    buf.addi(v_base, GP_ZERO, v_imm);
    buf.addi(out_base, GP_ZERO, v_msram_imm);
    buf.h_prefetch_m(out_base, v_base, v_base_hbm_reg, false, true);

    buf.addi(p_base, GP_ZERO, p_imm);
    buf.addi(v_base, GP_ZERO, v_msram_imm);
    buf.addi(out_base, GP_ZERO, out_imm);

    match stage {
        Stage::Prefill => {
            let outer_count = head_dim / blen;
            let inner_count = mlen / blen;
            buf.addi(out_col, GP_ZERO, out_imm);
            buf.loop_start(outer_loop, outer_count as u32);
            buf.loop_start(inner_loop, inner_count as u32);

            buf.m_mm(0, v_base, p_base);
            buf.m_mm_wo(out_base);
            buf.addi(p_base, p_base, (blen * mlen) as u32);
            buf.addi(out_base, out_base, (vlen * blen) as u32);

            buf.loop_end(inner_loop);

            // Next column block: P rewinds, output and V slide right.
            buf.addi(p_base, GP_ZERO, p_imm);
            buf.addi(out_col, out_col, blen as u32);
            buf.addi(out_base, out_col, 0);
            buf.addi(v_base, v_base, blen as u32);

            buf.loop_end(outer_loop);
        }
        Stage::Decode => {
            buf.loop_start(outer_loop, (head_dim / blen) as u32);
            buf.m_mv(0, v_base, p_base);
            buf.m_mv_wo(out_base);
            buf.addi(out_base, out_base, blen as u32);
            buf.addi(v_base, v_base, blen as u32);
            buf.loop_end(outer_loop);
        }
    }
    Ok(())
}
