pub mod key;
pub mod lockset;
pub mod transaction;

pub use key::*;
pub use lockset::*;
pub use transaction::*;
