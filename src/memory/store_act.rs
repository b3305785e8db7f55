use crate::error::EmitError;
use crate::isa::asm::AsmBuf;
use crate::isa::regfile::RegPool;
use crate::isa::{check_imm, HbmReg, GP_ZERO};
use crate::utils::calculation::div_ceil;

const COMPONENT: &str = "store_act";

/// Stores an activation from VRAM back to HBM, the reverse of the
/// driver-side preload.
///
/// VRAM holds the hardware block format `[batch, mlen, hidden/mlen]`; HBM is
/// row-major `[batch, hidden_size]`. `H_STORE_V` converts between the two in
/// stride mode, so the VRAM pointer advances linearly while HBM walks with
/// `STRIDE_REG` set to the row pitch.
///
/// `batch == 1` needs no stride: the tile streams out as contiguous bursts
/// of `vlen * store_amount` elements. Larger batches walk `hidden/vlen`
/// column blocks, with an inner loop over batch blocks only when the batch
/// exceeds one writeback burst.
#[allow(clippy::too_many_arguments)]
pub fn store_act(
    buf: &mut AsmBuf,
    vlen: usize,
    batch: usize,
    hidden_size: usize,
    pool: &RegPool,
    act_vram_offset: usize,
    hbm_addr_reg: HbmReg,
    stride_size: Option<usize>,
    store_amount: usize,
) -> Result<(), EmitError> {
    let gp = pool.gp(5, COMPONENT)?;
    let hbm_offset = gp[0];
    let stride_reg = gp[1];
    let vram = gp[2];
    let outer_loop = gp[3];
    let inner_loop = gp[4];

    let stride_len = stride_size.unwrap_or(hidden_size);
    let blocks_per_hidden = div_ceil(hidden_size, vlen);

    buf.comment("store activation");
    buf.addi(
        vram,
        GP_ZERO,
        check_imm(act_vram_offset, "act_vram_offset", COMPONENT)?,
    );
    buf.addi(hbm_offset, GP_ZERO, 0);

    if batch == 1 {
        let elements_per_store = vlen * store_amount;
        for _ in 0..div_ceil(hidden_size, elements_per_store) {
            buf.h_store_v(vram, hbm_offset, hbm_addr_reg, false, 0);
            buf.addi(vram, vram, elements_per_store as u32);
            buf.addi(hbm_offset, hbm_offset, elements_per_store as u32);
        }
    } else {
        check_imm(batch * hidden_size, "hbm_store_extent", COMPONENT)?;
        buf.addi(
            stride_reg,
            GP_ZERO,
            check_imm(stride_len, "hbm_row_stride", COMPONENT)?,
        );
        buf.set_stride_reg(stride_reg);
        // The stride is latched in hardware, so the register is free to
        // serve as the per-block HBM base.
        let hbm_base = stride_reg;

        buf.loop_start(outer_loop, blocks_per_hidden as u32);
        buf.addi(hbm_base, hbm_offset, 0);
        if batch > store_amount {
            buf.loop_start(inner_loop, div_ceil(batch, store_amount) as u32);
        }
        buf.h_store_v(vram, hbm_base, hbm_addr_reg, true, 0);
        buf.addi(vram, vram, (vlen * store_amount) as u32);
        if batch > store_amount {
            buf.addi(hbm_base, hbm_base, (hidden_size * store_amount) as u32);
            buf.loop_end(inner_loop);
        }
        buf.addi(hbm_offset, hbm_offset, vlen as u32);
        buf.loop_end(outer_loop);
    }
    Ok(())
}
