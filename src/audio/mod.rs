//! Audio pipeline: decoding, rate conversion, and device output

pub mod decode;
pub mod output;
pub mod resampler;
pub mod types;
