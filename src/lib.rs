//! Picgle — split an image into layers that stack back into the original,
//! or blend a set of images into one canvas.
//!
//! The decomposition side partitions a bitmap into N pieces along a block
//! grid or a Voronoi diagram ([`decompose`]), tracks run state in a
//! [`session::DecomposeSession`], and packages the pieces as PNGs
//! ([`export`]). The blend side stacks images under a configurable blend
//! mode ([`blend`]). All pixel math lives in [`canvas`].

#[macro_use]
pub mod logger;

pub mod blend;
pub mod canvas;
pub mod cli;
pub mod config;
pub mod decompose;
pub mod error;
pub mod export;
pub mod progress;
pub mod session;
pub mod watermark;
