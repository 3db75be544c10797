//! Deterministic decision rules: bid ceilings, interest levels and the
//! exclusion denylist. Nothing here performs I/O.

pub mod exclusion;
pub mod interest;
pub mod profit;

pub use exclusion::denylisted_keyword;
pub use interest::interest_level;
pub use profit::{ProfitConfig, ProfitModel};
