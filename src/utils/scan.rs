//! Introspection over emitted program text. Lines are `;`-comments or a
//! mnemonic followed by comma-separated operands; these helpers back the
//! structural checks the test suite runs on every emission.

use fxhash::FxHashMap;
use itertools::Itertools;

/// First token of every instruction line, comments and blanks skipped.
pub fn mnemonics(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with(';'))
        .filter_map(|l| l.split_whitespace().next())
}

/// Histogram of mnemonics in an emitted program.
pub fn mnemonic_counts(text: &str) -> FxHashMap<&str, usize> {
    let mut histogram = FxHashMap::default();
    for m in mnemonics(text) {
        *histogram.entry(m).or_insert(0usize) += 1;
    }
    histogram
}

/// Immediate (last) operands of every line with the given mnemonic.
pub fn immediate_operands(text: &str, mnemonic: &str) -> Vec<u64> {
    text.lines()
        .map(str::trim)
        .filter(|l| l.split_whitespace().next() == Some(mnemonic))
        .filter_map(|l| l.rsplit(',').next())
        .filter_map(|op| op.trim().parse().ok())
        .collect_vec()
}

/// Verifies every `C_LOOP_START gpX, N` is closed by a `C_LOOP_END gpX` in
/// program order with correct nesting.
pub fn check_loop_nesting(text: &str) -> Result<(), String> {
    let mut stack: Vec<&str> = vec![];
    for line in text.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("C_LOOP_START ") {
            let counter = rest.split(',').next().unwrap_or("").trim();
            stack.push(counter);
        } else if let Some(rest) = line.strip_prefix("C_LOOP_END ") {
            let counter = rest.trim();
            match stack.pop() {
                Some(open) if open == counter => {}
                Some(open) => return Err(format!("loop {open} closed by {counter}")),
                None => return Err(format!("unmatched C_LOOP_END {counter}")),
            }
        }
    }
    match stack.pop() {
        Some(open) => Err(format!("unclosed loop {open}")),
        None => Ok(()),
    }
}

/// True when no matrix multiply can read a stale V tile: every `M_MM`/`M_MV`
/// must be preceded by a V prefetch newer than the last K prefetch. K
/// prefetches are the ones the QK^T emitter issues with destination `gp0`.
pub fn no_stale_v_reads(text: &str) -> bool {
    let mut k_owns_msram = false;
    for line in text.lines().map(str::trim) {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("H_PREFETCH_M") => {
                let dst = tokens.next().unwrap_or("").trim_end_matches(',');
                k_owns_msram = dst == "gp0";
            }
            Some("M_MM") | Some("M_MV") => {
                if k_owns_msram {
                    return false;
                }
            }
            _ => {}
        }
    }
    true
}

/// The mask immediates loaded right before each `C_SET_V_MASK_REG`, in
/// program order.
pub fn v_mask_values(text: &str) -> Vec<u64> {
    text.lines()
        .map(str::trim)
        .tuple_windows()
        .filter(|(_, next)| next.starts_with("C_SET_V_MASK_REG"))
        .filter_map(|(line, _)| {
            line.starts_with("S_ADDI_INT")
                .then(|| line.rsplit(',').next())
                .flatten()
        })
        .filter_map(|op| op.trim().parse().ok())
        .collect_vec()
}
