mod reader;
mod writer;

pub use reader::{MemoryStream, StreamError};
pub use writer::StreamWriter;
