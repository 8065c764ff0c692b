pub mod boundary;
pub mod config;
pub mod crs;
pub mod data;
pub mod join;
pub mod layers;
pub mod map;
pub mod pipeline;
pub mod processing;
pub mod render;
pub mod types;
