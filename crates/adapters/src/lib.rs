pub mod export;
pub mod http;
pub mod log_forwarder;

pub use export::FileResultExporter;
pub use http::{HttpClientError, HttpConnectorClient};
pub use log_forwarder::{spawn_log_delivery, ChannelLogForwarder, DeliveryLimits, LogDeliveryHandle};
