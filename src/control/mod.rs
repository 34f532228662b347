//! Control laws.

pub mod balance;
pub mod pid;

pub use balance::{BalanceController, BalanceGains, BalanceInput};
pub use pid::Pid;
