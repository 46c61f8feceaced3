pub mod config;
pub mod constants;
pub mod tile_id;
