mod endpoint;
mod transaction;

pub use endpoint::*;
pub use transaction::*;
