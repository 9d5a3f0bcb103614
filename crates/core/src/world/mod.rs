pub mod generate;
pub mod map;
