pub mod store_act;

/// Rows moved per `H_STORE_V` writeback burst.
pub const HBM_V_WRITEBACK_AMOUNT: usize = 4;
