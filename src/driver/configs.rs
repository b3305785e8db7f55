use pyo3::exceptions::PyTypeError;
use pyo3::prelude::*;

use super::AttentionNode;

fn attr<'py, T: FromPyObject<'py>>(
    obj: &Bound<'py, PyAny>,
    owner: &str,
    name: &str,
    expected: &str,
) -> PyResult<T> {
    let value = obj
        .getattr(name)
        .map_err(|_| PyTypeError::new_err(format!("Expected '{name}' attribute in {owner} object")))?;
    value
        .extract()
        .map_err(|_| PyTypeError::new_err(format!("Expected '{name}' to be {expected}")))
}

/// Tile geometry, register pool, and memory bases handed over from the
/// Python driver. Attributes mirror the driver-side EmitterConfig object.
#[derive(Debug, Clone)]
pub struct EmitterConfig {
    pub mlen: usize,
    pub vlen: usize,
    pub blen: usize,
    pub free_int: Vec<u8>,
    pub free_fp: Vec<u8>,
    pub vsram_base: usize,
    pub fp_sram_start: usize,
    pub k_hbm_reg: u8,
    pub v_hbm_reg: u8,
}

impl<'py> FromPyObject<'py> for EmitterConfig {
    fn extract_bound(obj: &Bound<'py, PyAny>) -> PyResult<Self> {
        Ok(EmitterConfig {
            mlen: attr(obj, "EmitterConfig", "mlen", "an integer")?,
            vlen: attr(obj, "EmitterConfig", "vlen", "an integer")?,
            blen: attr(obj, "EmitterConfig", "blen", "an integer")?,
            free_int: attr(obj, "EmitterConfig", "free_int", "a list of register indices")?,
            free_fp: attr(obj, "EmitterConfig", "free_fp", "a list of register indices")?,
            vsram_base: attr(obj, "EmitterConfig", "vsram_base", "an integer")?,
            fp_sram_start: attr(obj, "EmitterConfig", "fp_sram_start", "an integer")?,
            k_hbm_reg: attr(obj, "EmitterConfig", "k_hbm_reg", "an integer in 0..8")?,
            v_hbm_reg: attr(obj, "EmitterConfig", "v_hbm_reg", "an integer in 0..8")?,
        })
    }
}

impl<'py> FromPyObject<'py> for AttentionNode {
    /// Extracts the graph parser's shape dict (key access, not attributes).
    fn extract_bound(obj: &Bound<'py, PyAny>) -> PyResult<Self> {
        let key = |name: &str| -> PyResult<usize> {
            let item = obj
                .get_item(name)
                .map_err(|_| PyTypeError::new_err(format!("Expected '{name}' key in shape dict")))?;
            item.extract()
                .map_err(|_| PyTypeError::new_err(format!("Expected '{name}' to be an integer")))
        };
        Ok(AttentionNode {
            batch: key("batch")?,
            hq: key("num_attention_heads")?,
            hkv: key("num_key_value_heads")?,
            d: key("head_dim")?,
            q_len: key("q_len")?,
            kv_len: key("kv_len")?,
            hidden_size: key("hidden_size")?,
        })
    }
}
