pub mod driver;
pub mod error;
pub mod flashattn;
pub mod isa;
pub mod memory;
pub mod test;
pub mod utils;

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::driver::configs::EmitterConfig;
use crate::driver::AttentionNode;
use crate::error::EmitError;
use crate::isa::asm::AsmBuf;
use crate::isa::regfile::RegPool;
use crate::isa::HbmReg;
use crate::memory::HBM_V_WRITEBACK_AMOUNT;

fn to_py(err: EmitError) -> PyErr {
    PyValueError::new_err(err.to_string())
}

/// Emits the flash-attention program for one attention node.
#[pyfunction]
fn emit_flash_attn(node: AttentionNode, stage: String, config: EmitterConfig) -> PyResult<String> {
    node.validate().map_err(to_py)?;
    driver::checked_stage(&node, &stage).map_err(to_py)?;
    flashattn::flash_attn_asm(
        config.mlen,
        config.vlen,
        config.blen,
        node.batch,
        node.hq,
        node.hkv,
        node.d,
        node.q_len,
        node.kv_len,
        &config.free_int,
        &config.free_fp,
        config.vsram_base,
        config.fp_sram_start,
        config.k_hbm_reg,
        config.v_hbm_reg,
    )
    .map_err(to_py)
}

/// Emits the VRAM-to-HBM activation store for one tensor.
#[pyfunction]
#[pyo3(signature = (vlen, batch, hidden_size, free_int, act_vram_offset, hbm_addr_reg, stride_size=None, store_amount=HBM_V_WRITEBACK_AMOUNT))]
#[allow(clippy::too_many_arguments)]
fn emit_store_act(
    vlen: usize,
    batch: usize,
    hidden_size: usize,
    free_int: Vec<u8>,
    act_vram_offset: usize,
    hbm_addr_reg: u8,
    stride_size: Option<usize>,
    store_amount: usize,
) -> PyResult<String> {
    let pool = RegPool::new(&free_int, &[]);
    let mut buf = AsmBuf::new();
    memory::store_act::store_act(
        &mut buf,
        vlen,
        batch,
        hidden_size,
        &pool,
        act_vram_offset,
        HbmReg(hbm_addr_reg),
        stride_size,
        store_amount,
    )
    .map_err(to_py)?;
    Ok(buf.into_text())
}

#[pymodule]
fn flash_asm(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(emit_flash_attn, m)?)?;
    m.add_function(wrap_pyfunction!(emit_store_act, m)?)?;
    Ok(())
}
