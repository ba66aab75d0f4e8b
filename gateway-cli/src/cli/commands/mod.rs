pub mod diff;
pub mod dump;
pub mod ping;
pub mod sync;
