pub mod backend;
pub mod codec;
pub mod config;
pub mod device;
pub mod error;
pub mod player;
pub mod sample;
pub mod track;

mod ring;
