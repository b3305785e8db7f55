use crate::error::EmitError;
use crate::flashattn::Stage;
use crate::isa::asm::AsmBuf;
use crate::isa::regfile::RegPool;
use crate::isa::{check_imm, GP_ZERO};

const COMPONENT: &str = "computing_o";

/// Rescales the stored O rows by the `exp(m_res)` saved by the softmax pass
/// and accumulates the fresh PV block on top, one row at a time:
///
/// O_row = O_row * m_res + PV_row        (masked to the current head's slot)
///
/// The V-mask register must already hold this head's mask; both vector ops
/// run with `mask_en = 1` so only the head's `d` slots inside each packed
/// `VLEN`-wide row are touched. O rows stride by `q_head_num * head_dim`
/// (VLEN), PV rows by `MLEN`.
///
/// The `stage` argument is part of the calling convention and is not
/// branched on.
#[allow(clippy::too_many_arguments)]
pub fn computing_o(
    buf: &mut AsmBuf,
    br: usize,
    mlen: usize,
    _stage: Stage,
    pool: &RegPool,
    m_res_base_address: usize,
    pv_base_address: usize,
    o_old_base_address: usize,
    head_dim: usize,
    q_head_num: usize,
) -> Result<(), EmitError> {
    if head_dim > mlen {
        return Err(EmitError::ShapeViolation {
            component: COMPONENT,
            constraint: "head_dim must be <= MLEN",
            value: head_dim,
        });
    }

    let gp = pool.gp(4, COMPONENT)?;
    let m_res_addr = gp[0];
    let o_addr = gp[1];
    let pv_addr = gp[2];
    let loop_reg = gp[3];
    let m_res = pool.fp(1, COMPONENT)?[0];

    let o_imm = check_imm(o_old_base_address, "o_old_base_address", COMPONENT)?;
    let m_res_imm = check_imm(m_res_base_address, "m_res_base_address", COMPONENT)?;
    let pv_imm = check_imm(pv_base_address, "pv_base_address", COMPONENT)?;

    buf.comment("o accumulate");
    buf.addi(o_addr, GP_ZERO, o_imm);
    buf.addi(m_res_addr, GP_ZERO, m_res_imm);
    buf.addi(pv_addr, GP_ZERO, pv_imm);

    buf.loop_start(loop_reg, br as u32);
    buf.ld_fp(m_res, m_res_addr, 0);
    buf.v_mul_vf(o_addr, o_addr, m_res, true);
    buf.v_add_vv(o_addr, o_addr, pv_addr, true);
    buf.addi(o_addr, o_addr, (q_head_num * head_dim) as u32);
    buf.addi(pv_addr, pv_addr, mlen as u32);
    buf.addi(m_res_addr, m_res_addr, 1);
    buf.loop_end(loop_reg);
    Ok(())
}

/// The final normalization: multiplies each of `br` packed O rows by the
/// reciprocal of its running denominator `l`, masked to one head's slot.
/// The caller sets the V-mask for the head before this pass.
///
/// The `stage` argument is part of the calling convention and is not
/// branched on.
#[allow(clippy::too_many_arguments)]
pub fn computing_row_wise_scaling(
    buf: &mut AsmBuf,
    br: usize,
    _stage: Stage,
    pool: &RegPool,
    o_old_base_address: usize,
    l_old_base_address: usize,
    o_row_stride: usize,
    use_mask: bool,
) -> Result<(), EmitError> {
    let gp = pool.gp(3, COMPONENT)?;
    let o_addr = gp[0];
    let l_addr = gp[1];
    let loop_reg = gp[2];
    let l_old = pool.fp(1, COMPONENT)?[0];

    let l_imm = check_imm(l_old_base_address, "l_old_base_address", COMPONENT)?;
    let o_imm = check_imm(o_old_base_address, "o_old_base_address", COMPONENT)?;

    buf.comment("row-wise 1/l scaling");
    buf.addi(l_addr, GP_ZERO, l_imm);
    buf.addi(o_addr, GP_ZERO, o_imm);

    buf.loop_start(loop_reg, br as u32);
    buf.ld_fp(l_old, l_addr, 0);
    buf.reci_fp(l_old, l_old);
    buf.v_mul_vf(o_addr, o_addr, l_old, use_mask);
    buf.addi(o_addr, o_addr, o_row_stride as u32);
    buf.addi(l_addr, l_addr, 1);
    buf.loop_end(loop_reg);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::utils::scan::mnemonic_counts;

    fn pool() -> RegPool {
        RegPool::new(&[1, 2, 3, 4], &[1])
    }

    #[test]
    fn accumulate_masks_both_vector_ops() {
        let mut buf = AsmBuf::new();
        computing_o(
            &mut buf,
            64,
            64,
            Stage::Prefill,
            &pool(),
            67,
            8192,
            12288,
            64,
            4,
        )
        .unwrap();
        assert!(buf.text().contains("V_MUL_VF gp2, gp2, f1, 1"));
        assert!(buf.text().contains("V_ADD_VV gp2, gp2, gp3, 1"));
        // O strides by the packed row width, PV by the tile side.
        assert!(buf.text().contains("S_ADDI_INT gp2, gp2, 256"));
        assert!(buf.text().contains("S_ADDI_INT gp3, gp3, 64"));
    }

    #[test]
    fn accumulate_rejects_wide_heads() {
        let mut buf = AsmBuf::new();
        let err = computing_o(
            &mut buf,
            64,
            64,
            Stage::Prefill,
            &pool(),
            0,
            0,
            0,
            128,
            1,
        )
        .unwrap_err();
        assert_eq!(
            err,
            EmitError::ShapeViolation {
                component: "computing_o",
                constraint: "head_dim must be <= MLEN",
                value: 128,
            }
        );
    }

    #[test]
    fn scaling_loops_br_rows_with_reciprocal() {
        let mut buf = AsmBuf::new();
        computing_row_wise_scaling(&mut buf, 64, Stage::Prefill, &pool(), 12288, 131, 256, true)
            .unwrap();
        let counts = mnemonic_counts(buf.text());
        assert_eq!(counts["S_RECI_FP"], 1);
        assert_eq!(counts["C_LOOP_START"], 1);
        assert!(buf.text().contains("C_LOOP_START gp3, 64"));
        assert!(buf.text().contains("V_MUL_VF gp1, gp1, f1, 1"));
    }

    #[test]
    fn scaling_can_run_unmasked() {
        let mut buf = AsmBuf::new();
        computing_row_wise_scaling(&mut buf, 4, Stage::Decode, &pool(), 0, 0, 64, false).unwrap();
        assert!(buf.text().contains("V_MUL_VF gp1, gp1, f1, 0"));
    }
}
