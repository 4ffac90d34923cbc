mod client;
mod request;
mod transport;

pub use client::{ResourceClient, SendError};
pub use request::{HttpRequest, RequestDescriptor};
pub use transport::{RawResponse, ReqwestTransport, Transport, TransportError};
