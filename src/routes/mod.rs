pub mod public;
pub mod salon;
