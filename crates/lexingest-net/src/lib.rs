//! Network layer: paced, retrying HTTP transport and pagination cursors.

pub mod clock;
pub mod cursor;
pub mod http;
pub mod transport;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use clock::{Clock, SystemClock};
pub use cursor::{Page, PageCursor, PageToken, Paginated, PaginationPolicy};
pub use http::{Backend, ConnectionError, Credentials, HttpRequest, HttpResponse, Method, ReqwestBackend};
pub use reqwest::Url;
pub use transport::{
    MAX_RETRY_AFTER, PacedTransport, TransportConfig, TransportError, USER_AGENT, retry_after,
};
