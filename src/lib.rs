//! 食事する哲学者。箸と発言権をモニタで排他制御する

pub mod config;
pub mod dinner;
pub mod monitor;
pub mod philosopher;
pub mod ring;
pub mod signal;

pub use config::{Config, DEFAULT_NUMBER_OF_PHILOSOPHERS, DINING_STEPS};
pub use dinner::{Dinner, DinnerError, Report};
pub use monitor::{Monitor, MonitorError, TableSnapshot};
pub use philosopher::{Outcome, Pause, Philosopher};
pub use ring::{ResourceRing, Seat, SeatError};
