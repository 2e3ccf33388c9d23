//! The outbound request governor.
//!
//! A FIFO dispatch queue that keeps the process inside the downstream API's
//! published rate limits (requests per second and per minute, measured over
//! sliding windows) and retries transient failures with backoff, without
//! caller involvement. One worker drains the queue sequentially, so at most
//! one request is ever in flight from this component.
//!
//! The network sits behind the [`Transport`] trait; production uses
//! [`HttpTransport`], tests inject scripted transports.

mod limiter;
mod queue;
mod transport;

pub use limiter::RequestWindow;
pub use queue::{DispatchError, DispatchHandle, DispatchOutcome, DispatchTicket, Dispatcher};
pub use transport::{
    HttpTransport, OutboundRequest, RequestAuth, Transport, TransportError, TransportResponse,
};
