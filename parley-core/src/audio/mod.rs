//! Both halves of the audio graph.
//!
//! Capture: cpal input → ring buffer → [`tap`] (resample, block, encode).
//! Playback: inbound chunk → [`playback::PlaybackScheduler`] → cpal output.
//!
//! The cpal callbacks on either side run on OS audio threads at elevated
//! priority. They **must not** block on a mutex or perform I/O.

pub mod capture;
pub mod device;
pub mod pcm;
pub mod playback;
pub mod resample;
pub mod tap;
