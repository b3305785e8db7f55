use crate::error::EmitError;
use crate::flashattn::Stage;
use crate::isa::asm::AsmBuf;
use crate::isa::regfile::RegPool;
use crate::isa::{check_imm, FP_ZERO, GP_ZERO};

const COMPONENT: &str = "reset";

/// Fills `count` runs of `per_stride` FP-SRAM slots, runs `stride` apart,
/// with the float preloaded at `value_addr`. Single-slot runs and single-run
/// fills elide the corresponding hardware loop.
///
/// The `stage` argument is part of the calling convention and is not
/// branched on.
#[allow(clippy::too_many_arguments)]
pub fn reset_fp_sram(
    buf: &mut AsmBuf,
    _stage: Stage,
    start: usize,
    per_stride: usize,
    stride: usize,
    count: usize,
    value_addr: usize,
    pool: &RegPool,
) -> Result<(), EmitError> {
    if count == 0 || per_stride == 0 {
        return Err(EmitError::ShapeViolation {
            component: COMPONENT,
            constraint: "reset extent must be positive",
            value: count.min(per_stride),
        });
    }

    let gp = pool.gp(4, COMPONENT)?;
    let addr = gp[0];
    let outer_loop = gp[1];
    let inner_loop = gp[2];
    let offset = gp[3];
    let val = pool.fp(1, COMPONENT)?[0];

    let start_imm = check_imm(start, "reset_start_address", COMPONENT)?;
    let value_imm = check_imm(value_addr, "reset_value_address", COMPONENT)?;
    // Last slot of the last run is the furthest store.
    check_imm(
        start + (count - 1) * stride + per_stride - 1,
        "reset_end_address",
        COMPONENT,
    )?;

    buf.comment(&format!(
        "fp-sram fill: {count} x {per_stride} slots from {start}, value slot {value_addr}"
    ));
    buf.addi(addr, GP_ZERO, start_imm);
    buf.ld_fp(val, GP_ZERO, value_imm);

    let run = |buf: &mut AsmBuf| {
        if per_stride > 1 {
            buf.loop_start(inner_loop, per_stride as u32);
            buf.st_fp(val, addr, 0);
            buf.addi(addr, addr, 1);
            buf.loop_end(inner_loop);
        } else {
            buf.st_fp(val, addr, 0);
            buf.addi(addr, addr, 1);
        }
    };

    if count > 1 {
        let stride_imm = check_imm(stride, "reset_stride", COMPONENT)?;
        // The run base lives in its own register so run k starts at
        // start + k*stride regardless of how far `addr` walked.
        buf.addi(offset, GP_ZERO, start_imm);
        buf.loop_start(outer_loop, count as u32);
        run(buf);
        buf.addi(offset, offset, stride_imm);
        buf.add_int(addr, GP_ZERO, offset);
        buf.loop_end(outer_loop);
    } else {
        run(buf);
    }
    Ok(())
}

/// Zeros `count * per_stride` consecutive VSRAM rows of width `vlen`
/// starting at `start`, by scaling each row with the hard-zero f0 (the
/// cheapest way to clear a vector row without a store path).
///
/// `stride` and `stage` are part of the calling convention; row runs are
/// contiguous and neither is branched on.
#[allow(clippy::too_many_arguments)]
pub fn reset_v_sram(
    buf: &mut AsmBuf,
    _stage: Stage,
    start: usize,
    vlen: usize,
    per_stride: usize,
    _stride: usize,
    count: usize,
    pool: &RegPool,
) -> Result<(), EmitError> {
    let gp = pool.gp(3, COMPONENT)?;
    let addr = gp[0];
    let outer_loop = gp[1];
    let inner_loop = gp[2];

    let start_imm = check_imm(start, "reset_start_address", COMPONENT)?;

    buf.comment(&format!(
        "vsram zero: {count} x {per_stride} rows of {vlen} from {start}"
    ));
    buf.addi(addr, GP_ZERO, start_imm);

    let row = |buf: &mut AsmBuf| {
        buf.v_mul_vf(addr, addr, FP_ZERO, false);
        buf.addi(addr, addr, vlen as u32);
    };

    match (count > 1, per_stride > 1) {
        (true, true) => {
            buf.loop_start(outer_loop, count as u32);
            buf.loop_start(inner_loop, per_stride as u32);
            row(buf);
            buf.loop_end(inner_loop);
            buf.loop_end(outer_loop);
        }
        (true, false) => {
            buf.loop_start(outer_loop, count as u32);
            row(buf);
            buf.loop_end(outer_loop);
        }
        (false, true) => {
            buf.loop_start(inner_loop, per_stride as u32);
            row(buf);
            buf.loop_end(inner_loop);
        }
        (false, false) => row(buf),
    }
    Ok(())
}

/// Programs the HBM prefetch scale/stride registers once per attention.
/// Two packing regimes: when a full K/V row (`hkv * d`) is narrower than a
/// tile side the rows are packed tightly at `MLEN` stride; otherwise the
/// stride is the true row pitch `hkv * d * batch`.
pub fn reset_kv_prefetch(
    buf: &mut AsmBuf,
    hkv: usize,
    d: usize,
    kv_len: usize,
    batch: usize,
    mlen: usize,
    pool: &RegPool,
) -> Result<(), EmitError> {
    let r = pool.gp(1, COMPONENT)?[0];
    check_imm(hkv * d * kv_len * batch, "kv_hbm_extent", COMPONENT)?;

    buf.comment("kv prefetch scale/stride");
    if hkv * d < mlen {
        buf.addi(
            r,
            GP_ZERO,
            check_imm(mlen * kv_len * batch, "kv_scale", COMPONENT)?,
        );
        buf.set_scale_reg(r);
        buf.addi(r, GP_ZERO, check_imm(mlen, "kv_stride", COMPONENT)?);
        buf.set_stride_reg(r);
    } else {
        buf.addi(
            r,
            GP_ZERO,
            check_imm(hkv * d * kv_len * batch, "kv_scale", COMPONENT)?,
        );
        buf.set_scale_reg(r);
        buf.addi(
            r,
            GP_ZERO,
            check_imm(hkv * d * batch, "kv_stride", COMPONENT)?,
        );
        buf.set_stride_reg(r);
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::utils::scan::mnemonic_counts;

    fn pool() -> RegPool {
        RegPool::new(&[1, 2, 3, 4, 5, 6], &[1, 2, 3, 4, 5])
    }

    #[test]
    fn fp_fill_elides_loops_for_single_run_single_slot() {
        let mut buf = AsmBuf::new();
        reset_fp_sram(&mut buf, Stage::Decode, 10, 1, 3, 1, 2, &pool()).unwrap();
        let counts = mnemonic_counts(buf.text());
        assert!(!counts.contains_key("C_LOOP_START"));
        assert_eq!(counts["S_ST_FP"], 1);
    }

    #[test]
    fn fp_fill_outer_loop_only_when_multiple_runs() {
        let mut buf = AsmBuf::new();
        reset_fp_sram(&mut buf, Stage::Decode, 10, 1, 3, 4, 2, &pool()).unwrap();
        let counts = mnemonic_counts(buf.text());
        assert_eq!(counts["C_LOOP_START"], 1);
        assert_eq!(counts["C_LOOP_END"], 1);
        // Run base register is seeded with the start address.
        assert!(buf.text().contains("S_ADDI_INT gp4, gp0, 10"));
    }

    #[test]
    fn fp_fill_nested_loops_for_grid() {
        let mut buf = AsmBuf::new();
        reset_fp_sram(&mut buf, Stage::Prefill, 3, 64, 192, 4, 2, &pool()).unwrap();
        let counts = mnemonic_counts(buf.text());
        assert_eq!(counts["C_LOOP_START"], 2);
        assert_eq!(counts["S_ST_FP"], 1);
    }

    #[test]
    fn fp_fill_end_address_is_checked() {
        let mut buf = AsmBuf::new();
        let err =
            reset_fp_sram(&mut buf, Stage::Prefill, 262_000, 64, 192, 4, 2, &pool()).unwrap_err();
        assert!(matches!(
            err,
            crate::error::EmitError::AddressOverflow { .. }
        ));
    }

    #[test]
    fn vsram_zero_single_row() {
        let mut buf = AsmBuf::new();
        reset_v_sram(&mut buf, Stage::Decode, 36, 4, 1, 4, 1, &pool()).unwrap();
        assert_eq!(
            buf.text(),
            "; vsram zero: 1 x 1 rows of 4 from 36\n\
             S_ADDI_INT gp1, gp0, 36\n\
             V_MUL_VF gp1, gp1, f0, 0\n\
             S_ADDI_INT gp1, gp1, 4\n"
        );
    }

    #[test]
    fn kv_prefetch_tight_regime() {
        // hkv*d = 4 < mlen = 64: packed rows, stride MLEN.
        let mut buf = AsmBuf::new();
        reset_kv_prefetch(&mut buf, 1, 4, 32, 1, 64, &pool()).unwrap();
        assert!(buf.text().contains("S_ADDI_INT gp1, gp0, 2048")); // 64 * 32
        assert!(buf.text().contains("C_SET_SCALE_REG gp1"));
        assert!(buf.text().contains("S_ADDI_INT gp1, gp0, 64"));
        assert!(buf.text().contains("C_SET_STRIDE_REG gp1"));
    }

    #[test]
    fn kv_prefetch_wide_regime() {
        // hkv*d = 128 >= mlen = 64: true row pitch.
        let mut buf = AsmBuf::new();
        reset_kv_prefetch(&mut buf, 2, 64, 16, 2, 64, &pool()).unwrap();
        assert!(buf.text().contains("S_ADDI_INT gp1, gp0, 8192")); // 2*64*16*2
        assert!(buf.text().contains("S_ADDI_INT gp1, gp0, 256")); // 2*64*2
    }

    #[test]
    fn kv_prefetch_extent_overflow() {
        let mut buf = AsmBuf::new();
        let err = reset_kv_prefetch(&mut buf, 8, 128, 4096, 1, 64, &pool()).unwrap_err();
        assert!(matches!(
            err,
            crate::error::EmitError::AddressOverflow { .. }
        ));
    }
}
