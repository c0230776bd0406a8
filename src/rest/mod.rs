//! REST side of the connector
//!
//! - `classifier`: response → verdict (pure)
//! - `retry`: backoff policy
//! - `throttle`: admission gate keyed by endpoint
//! - `transport`: HTTP seam and the reqwest implementation
//! - `executor`: ties them together into `execute()`

pub mod classifier;
pub mod error;
pub mod executor;
pub mod retry;
pub mod throttle;
pub mod transport;

pub use classifier::{classify, Body, ClassifiedResponse, Verdict};
pub use error::ApiError;
pub use executor::{RequestDescriptor, RestExecutor};
pub use retry::RetryPolicy;
pub use throttle::{KeyedThrottle, ThrottleGate, ThrottlePermit, Unthrottled};
pub use transport::{HttpRequest, HttpTransport, RawResponse, ReqwestTransport, TransportError};
