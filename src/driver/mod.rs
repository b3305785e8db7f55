pub mod configs;

use serde::Deserialize;

use crate::error::EmitError;
use crate::flashattn::Stage;

const COMPONENT: &str = "driver";

/// One attention node as handed over by the graph parser. Field names map
/// the parser's shape-dict keys onto the emitter's vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AttentionNode {
    pub batch: usize,
    #[serde(rename = "num_attention_heads")]
    pub hq: usize,
    #[serde(rename = "num_key_value_heads")]
    pub hkv: usize,
    #[serde(rename = "head_dim")]
    pub d: usize,
    pub q_len: usize,
    pub kv_len: usize,
    pub hidden_size: usize,
}

impl AttentionNode {
    /// Parses the shape dict of a single attention node from its JSON form.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Checks the node's dimensions before they reach the emitters.
    pub fn validate(&self) -> Result<(), EmitError> {
        for (constraint, value) in [
            ("batch must be positive", self.batch),
            ("num_attention_heads must be positive", self.hq),
            ("num_key_value_heads must be positive", self.hkv),
            ("head_dim must be positive", self.d),
            ("q_len must be positive", self.q_len),
            ("kv_len must be positive", self.kv_len),
            ("hidden_size must be positive", self.hidden_size),
        ] {
            if value == 0 {
                return Err(EmitError::ShapeViolation {
                    component: COMPONENT,
                    constraint,
                    value,
                });
            }
        }
        if self.hq % self.hkv != 0 {
            return Err(EmitError::ShapeViolation {
                component: COMPONENT,
                constraint: "hq must be a multiple of hkv",
                value: self.hq,
            });
        }
        Ok(())
    }
}

/// Parses the parser-supplied stage string and cross-checks it against the
/// node: decode is exactly the `q_len == 1` case.
pub fn checked_stage(node: &AttentionNode, stage: &str) -> Result<Stage, EmitError> {
    let parsed: Stage = stage.parse()?;
    if parsed != Stage::for_q_len(node.q_len) {
        return Err(EmitError::ShapeViolation {
            component: COMPONENT,
            constraint: "stage must match q_len (decode iff q_len == 1)",
            value: node.q_len,
        });
    }
    Ok(parsed)
}
