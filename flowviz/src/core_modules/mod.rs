pub mod collection;
pub mod color_wheel;
pub mod colorizer;
pub mod flo_codec;
pub mod flow_field;
pub mod overlay;
