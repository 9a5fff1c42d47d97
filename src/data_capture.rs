pub mod line_framer;
pub mod stdio_capture;
pub mod types;

pub use line_framer::LineFramer;
pub use stdio_capture::StdioCapture;
pub use types::StdioStream;
