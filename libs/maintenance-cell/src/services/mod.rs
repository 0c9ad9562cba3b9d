pub mod expirer;
pub mod reminder;
pub mod retention;
pub mod runner;

pub use expirer::*;
pub use reminder::*;
pub use retention::*;
pub use runner::*;
