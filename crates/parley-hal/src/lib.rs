//! `parley-hal` – camera access for the Parley agent.
//!
//! # Modules
//!
//! - [`camera`] – the [`Camera`][camera::Camera] driver trait, the encoded
//!   [`CameraFrame`][camera::CameraFrame] it returns, and a file-backed
//!   [`ImageFileCamera`][camera::ImageFileCamera] for bench runs without a
//!   physical sensor.
//! - [`frame_slot`] – [`LatestFrame`][frame_slot::LatestFrame] and
//!   [`FrameProducer`][frame_slot::FrameProducer]: a background capture
//!   thread that keeps overwriting a single shared slot so the decision tick
//!   always sees the newest frame and never a backlog.

pub mod camera;
pub mod frame_slot;

pub use camera::{Camera, CameraFrame, FrameEncoding, ImageFileCamera};
pub use frame_slot::{FrameProducer, LatestFrame};
