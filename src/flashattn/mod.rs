pub mod online_softmax;
pub mod output;
pub mod overall;
pub mod pv;
pub mod qkt;
pub mod reset;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EmitError;

pub use overall::flash_attn_asm;

/// Execution stage of the attention layer. Decode is the degenerate
/// `q_len == 1` case: per-row loops collapse to a single body and the
/// matrix engine switches to its vector forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Prefill,
    Decode,
}

impl Stage {
    /// Stage of a layer with `q_len` query tokens.
    pub fn for_q_len(q_len: usize) -> Self {
        if q_len == 1 {
            Stage::Decode
        } else {
            Stage::Prefill
        }
    }

    pub fn is_prefill(self) -> bool {
        matches!(self, Stage::Prefill)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Prefill => write!(f, "prefill"),
            Stage::Decode => write!(f, "decode"),
        }
    }
}

impl FromStr for Stage {
    type Err = EmitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prefill" => Ok(Stage::Prefill),
            "decode" => Ok(Stage::Decode),
            other => Err(EmitError::UnsupportedStage {
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod test {
    use super::Stage;
    use crate::error::EmitError;

    #[test]
    fn stage_from_q_len() {
        assert_eq!(Stage::for_q_len(1), Stage::Decode);
        assert_eq!(Stage::for_q_len(64), Stage::Prefill);
    }

    #[test]
    fn stage_parsing() {
        assert_eq!("prefill".parse::<Stage>().unwrap(), Stage::Prefill);
        assert_eq!("decode".parse::<Stage>().unwrap(), Stage::Decode);
        let err = "chunked_prefill".parse::<Stage>().unwrap_err();
        assert!(matches!(err, EmitError::UnsupportedStage { .. }));
    }
}
