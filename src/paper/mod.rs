//! Paper trading core: spec.md §4.8. Module split mirrors the teacher's
//! `vault/mod.rs` re-export style — each concern (account, position
//! lifecycle, stop-loss, strategy scoring, orchestration) gets its own file.

pub mod account;
pub mod position;
pub mod position_manager;
pub mod stop_loss;
pub mod strategy;

pub use account::VirtualAccount;
pub use position_manager::PositionManager;
pub use stop_loss::StopLossManager;
pub use strategy::Strategy;
