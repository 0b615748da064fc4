pub mod horizon;
pub mod interval;
