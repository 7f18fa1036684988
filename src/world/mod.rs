pub mod position;
pub mod resources;
