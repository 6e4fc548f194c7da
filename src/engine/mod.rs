//! Launching and supervising the external rendering engine.

pub mod locate;
pub mod process_tree;
pub mod runner;
pub mod supervise;
