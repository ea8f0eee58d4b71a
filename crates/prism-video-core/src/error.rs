//! Error types for the playback engine.

/// Errors that can occur while constructing or driving the playback engine.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerError {
    /// The media source could not be opened or is unusable
    OpenFailed(String),
    /// The color conversion program could not be prepared
    PipelinePreparation(String),
    /// A pixel buffer plane could not be mapped to a GPU surface
    PlaneMapping(String),
    /// An output framebuffer could not be acquired from the pool
    FramebufferAcquire(String),
    /// A pixel buffer was malformed (bad stride or short plane data)
    InvalidBuffer(String),
    /// Copying the decoded pixel buffer from the source failed
    BufferCopy(String),
    /// A seek against the external source failed
    SeekFailed(String),
    /// Generic error
    Generic(String),
}

impl std::fmt::Display for PlayerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerError::OpenFailed(msg) => write!(f, "Failed to open media source: {msg}"),
            PlayerError::PipelinePreparation(msg) => {
                write!(f, "Conversion pipeline preparation failed: {msg}")
            }
            PlayerError::PlaneMapping(msg) => write!(f, "Plane mapping failed: {msg}"),
            PlayerError::FramebufferAcquire(msg) => {
                write!(f, "Framebuffer acquisition failed: {msg}")
            }
            PlayerError::InvalidBuffer(msg) => write!(f, "Invalid pixel buffer: {msg}"),
            PlayerError::BufferCopy(msg) => write!(f, "Pixel buffer copy failed: {msg}"),
            PlayerError::SeekFailed(msg) => write!(f, "Seek failed: {msg}"),
            PlayerError::Generic(msg) => write!(f, "Playback error: {msg}"),
        }
    }
}

impl std::error::Error for PlayerError {}
