pub mod farmer;
pub mod good;
pub mod inventory;
pub mod player;
