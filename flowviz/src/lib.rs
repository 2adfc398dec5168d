// THEORY:
// This file is the entry point for the `flowviz` library crate. It exposes a
// small, high-level API for turning optical flow into pictures: the
// `FlowColorizer` and its `ColorWheel` for the color encoding, the `.flo`
// codec and directory loaders for getting fields in, and `FlowAnimation` plus
// the `ExportPool` for getting frames out.
//
// The encoding itself lives in `core_modules`, which has no I/O of its own
// apart from the codec and loaders. Configuration, errors and export are
// crate-level concerns shared by every stage.

pub mod animation;
pub mod config;
pub mod core_modules;
pub mod error;
pub mod export;

pub use animation::{FlowAnimation, Video};
pub use config::RenderConfig;
pub use core_modules::collection::{read_flow_collection, read_image_collection};
pub use core_modules::color_wheel::color_wheel::ColorWheel;
pub use core_modules::colorizer::{FlowColorizer, motion_to_color};
pub use core_modules::flo_codec::{read_flow, write_flow};
pub use core_modules::flow_field::MotionRange;
pub use error::{Error, Result};
pub use export::ExportPool;
