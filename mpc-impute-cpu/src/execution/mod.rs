pub mod local;
pub mod player;
pub mod session;
