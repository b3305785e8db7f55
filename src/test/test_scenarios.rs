#[cfg(test)]
mod test {
    use crate::error::EmitError;
    use crate::flashattn::flash_attn_asm;
    use crate::utils::scan::{check_loop_nesting, mnemonic_counts, v_mask_values};

    const FREE_INT: [u8; 6] = [1, 2, 3, 4, 5, 6];
    const FREE_FP: [u8; 5] = [1, 2, 3, 4, 5];

    #[allow(clippy::too_many_arguments)]
    fn emit(
        mlen: usize,
        vlen: usize,
        blen: usize,
        hq: usize,
        hkv: usize,
        d: usize,
        q_len: usize,
        kv_len: usize,
        vsram_base: usize,
    ) -> Result<String, EmitError> {
        flash_attn_asm(
            mlen, vlen, blen, 1, hq, hkv, d, q_len, kv_len, &FREE_INT, &FREE_FP, vsram_base, 3, 1,
            2,
        )
    }

    #[test]
    fn single_head_prefill_tile() {
        let text = emit(64, 64, 1, 1, 1, 64, 64, 64, 0).unwrap();
        let counts = mnemonic_counts(&text);
        // One KV head, one K tile, one Q tile, one inner head pass.
        assert_eq!(counts["M_BTMM"], 1);
        assert_eq!(counts["M_BMM_WO"], 1);
        assert_eq!(counts["M_MM"], 1);
        assert_eq!(counts["M_MM_WO"], 1);
        // K prefetch plus the mandatory V re-prefetch.
        assert_eq!(counts["H_PREFETCH_M"], 2);
        // One softmax pass and one row-wise scale pass.
        assert_eq!(counts["V_RED_MAX"], 1);
        assert_eq!(counts["V_RED_SUM"], 1);
        assert_eq!(counts["S_RECI_FP"], 1);
        assert!(!counts.contains_key("M_BTMV"));
        check_loop_nesting(&text).unwrap();
    }

    #[test]
    fn single_head_decode_swaps_matrix_forms() {
        let text = emit(64, 64, 1, 1, 1, 64, 1, 64, 0).unwrap();
        let counts = mnemonic_counts(&text);
        assert_eq!(counts["M_BTMV"], 1);
        assert_eq!(counts["M_BMV_WO"], 1);
        assert_eq!(counts["M_MV"], 1);
        assert_eq!(counts["M_MV_WO"], 1);
        assert!(!counts.contains_key("M_BTMM"));
        assert!(!counts.contains_key("M_MM"));
        // No hardware loop wraps the softmax body: the only loops left are
        // the PV column walk, the accumulate pass, and the scale pass.
        assert_eq!(counts["C_LOOP_START"], 3);
        assert_eq!(counts["C_LOOP_END"], 3);
        assert_eq!(counts["V_RED_MAX"], 1);
        check_loop_nesting(&text).unwrap();
    }

    #[test]
    fn gqa_group_shares_one_qkt_per_k_tile() {
        // 4 Q heads on 1 KV head, 2 K tiles of the 128-token KV sequence.
        let text = emit(64, 256, 4, 4, 1, 64, 64, 128, 0).unwrap();
        let counts = mnemonic_counts(&text);
        assert_eq!(counts["M_BTMM"], 2);
        // Per K tile: 4 softmax, 4 PV, 4 accumulate passes.
        assert_eq!(counts["V_RED_MAX"], 8);
        assert_eq!(counts["M_MM"], 8);
        assert_eq!(counts["V_ADD_VV"], 8);
        // The m/l/O state is seeded once and accumulates across both K
        // tiles; the final scale pass runs once per head, not per K tile.
        // 3 loads per softmax, 1 per accumulate, 1 per fill, 1 per scale.
        assert_eq!(counts["S_LD_FP"], 3 * 8 + 8 + 2 + 4);
        assert_eq!(counts["S_RECI_FP"], 4);
        // Every PV pass re-prefetches V after the K prefetch: 2 K + 8 V.
        assert_eq!(counts["H_PREFETCH_M"], 10);
        // Head masks walk 1, 2, 4, 8 through the accumulate passes of each
        // K tile, then once more through the final row-wise scale passes.
        let per_pass = [1u64, 2, 4, 8];
        let expected: Vec<u64> = per_pass
            .iter()
            .cycle()
            .take(per_pass.len() * 3)
            .copied()
            .collect();
        assert_eq!(v_mask_values(&text), expected);
        check_loop_nesting(&text).unwrap();
    }

    #[test]
    fn wide_head_is_a_shape_violation() {
        let err = emit(64, 128, 1, 1, 1, 128, 64, 64, 0).unwrap_err();
        assert_eq!(
            err,
            EmitError::ShapeViolation {
                component: "flash_attn_asm",
                constraint: "head_dim must be <= MLEN",
                value: 128,
            }
        );
    }

    #[test]
    fn o_base_overflow_fails_before_any_instruction() {
        let err = emit(64, 64, 1, 1, 1, 64, 64, 64, 250_000).unwrap_err();
        assert_eq!(
            err,
            EmitError::AddressOverflow {
                component: "flash_attn_asm",
                what: "o_old_base_address",
                value: 262_288,
            }
        );
    }

    #[test]
    fn batch_depth_must_match_group() {
        let err = emit(64, 256, 2, 4, 1, 64, 64, 64, 0).unwrap_err();
        assert_eq!(
            err,
            EmitError::ShapeViolation {
                component: "flash_attn_asm",
                constraint: "BLEN must equal hq/hkv",
                value: 2,
            }
        );
    }

    #[test]
    fn starved_pool_fails_up_front() {
        let err = flash_attn_asm(
            64,
            64,
            1,
            1,
            1,
            1,
            64,
            64,
            64,
            &[1, 2, 3],
            &FREE_FP,
            0,
            3,
            1,
            2,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            EmitError::RegisterStarvation {
                needed: 6,
                available: 3,
                ..
            }
        ));
    }
}
