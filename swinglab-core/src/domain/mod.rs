//! Domain types for SwingLab

pub mod bar;
pub mod equity;
pub mod position;
pub mod trade;

pub use bar::Bar;
pub use equity::EquitySample;
pub use position::{OpenPosition, Position, PositionError, PositionInfo, PositionSide};
pub use trade::{CloseReason, TradeRecord};
