pub mod client;
pub mod logging;
#[cfg(test)]
pub mod mock_client;
pub mod stream;
pub mod threads;
pub mod upload;

pub use client::{ByteStream, PipelineClient, StreamRequest};
pub use stream::{DecodedChunk, FrameDecoder};
pub use threads::ThreadStateClient;
pub use upload::UploadClient;
