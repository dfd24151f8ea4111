#![deny(unused_must_use)]

extern crate core;

pub mod attributes;
pub mod config;
pub mod error;
pub mod events;
pub mod geometry;
pub mod lru_cache;
pub mod node_lru;
pub mod octree_source;
pub mod priority_queue;
pub mod profile;
pub mod profile_controller;
pub mod profile_request;
pub mod projected_entry;
pub mod segment_filter;

pub use nalgebra;
