//! HTTP types shared by the context and the host transport.

mod request;
mod response;
mod stream;

pub use request::{HostRequest, RequestBody};
pub use response::{ResponseBody, StagedResponse};
pub use stream::{
    OpenedStream, ResponseStream, StreamBody, FILE_CHUNK_SIZE, READER_CHUNK_SIZE,
};
