//! `wled_control` is the device colour control core of a WLED client.
//!
//! # Structure
//!
//! * [gradient]: pure gradient sampling into per-pixel hex colours
//! * [capabilities]: per-segment RGB/White/CCT capability detection and caching
//! * [pipeline]: the per-device colour pipeline, which serializes intents into device calls and
//!   coalesces brightness changes issued during per-pixel uploads
//! * [transition]: client-side animated transitions between two gradients
//! * [api]: the device API seam the pipeline talks to
//!
//! # License
//!
//! This source code is released under the [MIT-License](https://opensource.org/licenses/MIT)

#[macro_use]
extern crate tracing;
#[macro_use]
extern crate serde_derive;

pub mod api;
pub mod capabilities;
pub mod config;
pub mod gradient;
pub mod models;
pub mod pipeline;
pub mod transition;
