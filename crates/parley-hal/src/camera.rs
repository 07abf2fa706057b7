//! Generic `Camera` trait and supporting types for image-capture hardware.

use std::path::{Path, PathBuf};

use parley_types::ParleyError;

/// How the bytes of a [`CameraFrame`] are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEncoding {
    Jpeg,
    Png,
}

impl FrameEncoding {
    /// MIME type used when the frame is shipped to a vision model.
    pub fn mime_type(self) -> &'static str {
        match self {
            FrameEncoding::Jpeg => "image/jpeg",
            FrameEncoding::Png => "image/png",
        }
    }

    /// Guess the encoding from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some(FrameEncoding::Jpeg),
            "png" => Some(FrameEncoding::Png),
            _ => None,
        }
    }
}

/// An encoded image frame returned by a camera driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraFrame {
    /// Monotonic capture counter assigned by the producer (0 if unset).
    pub sequence: u64,
    pub encoding: FrameEncoding,
    /// Encoded image bytes.
    pub data: Vec<u8>,
}

impl CameraFrame {
    pub fn new(encoding: FrameEncoding, data: Vec<u8>) -> Self {
        Self {
            sequence: 0,
            encoding,
            data,
        }
    }
}

/// A camera or image-capture device.
pub trait Camera: Send {
    /// Stable identifier for this camera, e.g. `"front_rgb"`.
    fn id(&self) -> &str;

    /// Capture and return the next available frame.
    ///
    /// # Errors
    ///
    /// Returns [`ParleyError::HardwareFault`] if the frame cannot be captured
    /// (e.g. the device is disconnected or the buffer is unavailable).
    fn capture(&mut self) -> Result<CameraFrame, ParleyError>;
}

/// A camera that re-reads a still image from disk on every capture.
///
/// Editing the file while the agent runs changes what the agent "sees".
pub struct ImageFileCamera {
    id: String,
    path: PathBuf,
    encoding: FrameEncoding,
}

impl ImageFileCamera {
    /// # Errors
    ///
    /// Returns [`ParleyError::Config`] when the extension is not a supported
    /// image encoding.
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Result<Self, ParleyError> {
        let path = path.into();
        let encoding = FrameEncoding::from_path(&path).ok_or_else(|| {
            ParleyError::Config(format!(
                "unsupported image type for camera source {}",
                path.display()
            ))
        })?;
        Ok(Self {
            id: id.into(),
            path,
            encoding,
        })
    }
}

impl Camera for ImageFileCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn capture(&mut self) -> Result<CameraFrame, ParleyError> {
        let data = std::fs::read(&self.path).map_err(|e| ParleyError::HardwareFault {
            component: self.id.clone(),
            details: format!("failed to read {}: {e}", self.path.display()),
        })?;
        Ok(CameraFrame::new(self.encoding, data))
    }
}
