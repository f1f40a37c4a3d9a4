pub mod enums;
pub mod market;
pub mod packets;
pub mod trade;
pub mod trade_reqs;

pub use enums::*;
pub use market::*;
pub use packets::*;
pub use trade::*;
pub use trade_reqs::*;
