pub mod stats;
pub mod stress;
pub mod tunable;
