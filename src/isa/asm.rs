use std::fmt;
use std::fmt::Write as _;

use super::{Fp, Gp, HbmReg};

/// Append-only buffer of target instructions. One method per mnemonic, so
/// the emitters read like the programs they produce. Lines are
/// `mnemonic op, op, ...` terminated by a newline; `;` opens a comment line.
#[derive(Debug, Default)]
pub struct AsmBuf {
    text: String,
}

impl AsmBuf {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_line(&mut self, args: fmt::Arguments<'_>) {
        // Writing into a String cannot fail.
        let _ = self.text.write_fmt(args);
        self.text.push('\n');
    }

    pub fn comment(&mut self, note: &str) {
        self.push_line(format_args!("; {note}"));
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    // -- scalar integer --

    pub fn addi(&mut self, rd: Gp, rs: Gp, imm: u32) {
        self.push_line(format_args!("S_ADDI_INT {rd}, {rs}, {imm}"));
    }

    pub fn add_int(&mut self, rd: Gp, rs1: Gp, rs2: Gp) {
        self.push_line(format_args!("S_ADD_INT {rd}, {rs1}, {rs2}"));
    }

    // -- scalar floating point --

    pub fn ld_fp(&mut self, fd: Fp, base: Gp, imm: u32) {
        self.push_line(format_args!("S_LD_FP {fd}, {base}, {imm}"));
    }

    pub fn st_fp(&mut self, fs: Fp, base: Gp, imm: u32) {
        self.push_line(format_args!("S_ST_FP {fs}, {base}, {imm}"));
    }

    pub fn add_fp(&mut self, fd: Fp, fa: Fp, fb: Fp) {
        self.push_line(format_args!("S_ADD_FP {fd}, {fa}, {fb}"));
    }

    pub fn sub_fp(&mut self, fd: Fp, fa: Fp, fb: Fp) {
        self.push_line(format_args!("S_SUB_FP {fd}, {fa}, {fb}"));
    }

    pub fn mul_fp(&mut self, fd: Fp, fa: Fp, fb: Fp) {
        self.push_line(format_args!("S_MUL_FP {fd}, {fa}, {fb}"));
    }

    pub fn exp_fp(&mut self, fd: Fp, fs: Fp) {
        self.push_line(format_args!("S_EXP_FP {fd}, {fs}"));
    }

    pub fn reci_fp(&mut self, fd: Fp, fs: Fp) {
        self.push_line(format_args!("S_RECI_FP {fd}, {fs}"));
    }

    // -- vector --

    pub fn v_mul_vf(&mut self, vd: Gp, vs: Gp, f: Fp, mask_en: bool) {
        self.push_line(format_args!("V_MUL_VF {vd}, {vs}, {f}, {}", mask_en as u8));
    }

    /// The trailing reserved field is always zero in this ISA revision.
    pub fn v_sub_vf(&mut self, vd: Gp, vs: Gp, f: Fp, mask_en: bool) {
        self.push_line(format_args!(
            "V_SUB_VF {vd}, {vs}, {f}, {}, 0",
            mask_en as u8
        ));
    }

    pub fn v_add_vv(&mut self, vd: Gp, va: Gp, vb: Gp, mask_en: bool) {
        self.push_line(format_args!(
            "V_ADD_VV {vd}, {va}, {vb}, {}",
            mask_en as u8
        ));
    }

    pub fn v_exp_v(&mut self, vd: Gp, vs: Gp, mask_en: bool) {
        self.push_line(format_args!("V_EXP_V {vd}, {vs}, {}", mask_en as u8));
    }

    pub fn v_red_max(&mut self, fd: Fp, vs: Gp) {
        self.push_line(format_args!("V_RED_MAX {fd}, {vs}, 0"));
    }

    pub fn v_red_sum(&mut self, fd: Fp, vs: Gp) {
        self.push_line(format_args!("V_RED_SUM {fd}, {vs}"));
    }

    // -- matrix engine --

    pub fn m_btmm(&mut self, msram: u32, q: Gp, wt: Gp) {
        self.push_line(format_args!("M_BTMM {msram}, {q}, {wt}"));
    }

    pub fn m_btmv(&mut self, msram: u32, q: Gp, wt: Gp) {
        self.push_line(format_args!("M_BTMV {msram}, {q}, {wt}"));
    }

    pub fn m_bmm_wo(&mut self, dst: Gp) {
        self.push_line(format_args!("M_BMM_WO {dst}, 0"));
    }

    pub fn m_bmv_wo(&mut self, dst: Gp) {
        self.push_line(format_args!("M_BMV_WO {dst}, 0"));
    }

    pub fn m_mm(&mut self, msram: u32, a: Gp, b: Gp) {
        self.push_line(format_args!("M_MM {msram}, {a}, {b}"));
    }

    pub fn m_mv(&mut self, msram: u32, a: Gp, b: Gp) {
        self.push_line(format_args!("M_MV {msram}, {a}, {b}"));
    }

    pub fn m_mm_wo(&mut self, dst: Gp) {
        self.push_line(format_args!("M_MM_WO {dst}, gp0, 0"));
    }

    pub fn m_mv_wo(&mut self, dst: Gp) {
        self.push_line(format_args!("M_MV_WO {dst}, gp0, 0"));
    }

    // -- HBM --

    pub fn h_prefetch_m(
        &mut self,
        dst: Gp,
        offset: Gp,
        base: HbmReg,
        stride_en: bool,
        scale_en: bool,
    ) {
        self.push_line(format_args!(
            "H_PREFETCH_M {dst}, {offset}, {base}, {}, {}",
            stride_en as u8, scale_en as u8
        ));
    }

    /// `precision`: 0 = activation, 1 = key/value.
    pub fn h_store_v(&mut self, src: Gp, offset: Gp, base: HbmReg, stride_en: bool, precision: u8) {
        self.push_line(format_args!(
            "H_STORE_V {src}, {offset}, {base}, {}, {precision}",
            stride_en as u8
        ));
    }

    // -- control --

    pub fn loop_start(&mut self, counter: Gp, trip: u32) {
        self.push_line(format_args!("C_LOOP_START {counter}, {trip}"));
    }

    pub fn loop_end(&mut self, counter: Gp) {
        self.push_line(format_args!("C_LOOP_END {counter}"));
    }

    pub fn set_stride_reg(&mut self, r: Gp) {
        self.push_line(format_args!("C_SET_STRIDE_REG {r}"));
    }

    pub fn set_scale_reg(&mut self, r: Gp) {
        self.push_line(format_args!("C_SET_SCALE_REG {r}"));
    }

    pub fn set_v_mask_reg(&mut self, r: Gp) {
        self.push_line(format_args!("C_SET_V_MASK_REG {r}"));
    }
}
