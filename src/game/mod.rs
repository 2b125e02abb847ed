pub mod constants;
pub mod lifecycle;
pub mod state;
pub mod systems;
pub mod weapons;
