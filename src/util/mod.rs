pub mod metrics;
pub mod serializer;

pub use metrics::PoolMetrics;
pub use serializer::{BytesSerializer, Serializer, TextSerializer};
