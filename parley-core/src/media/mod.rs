//! Camera, video surface, frame sampling and session recording.

pub mod camera;
pub mod frames;
pub mod recorder;
pub mod video;
