// Aave v3 scaled-balance accounting: per-revision token math, mint/burn
// processors, the GHO discount engine, and the transaction-scoped event
// matcher that feeds them.

pub mod events;
pub mod gho;
pub mod matcher;
pub mod processors;
pub mod token_math;
