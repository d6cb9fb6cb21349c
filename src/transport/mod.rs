mod http_transport;
pub mod vendor;

pub use http_transport::{HttpTransport, UpstreamResponse};
pub use vendor::build_vendor_body;
