pub mod config;
pub mod options;
pub mod record;
pub mod spec;
pub mod value;

pub use config::{Config, DatabaseConfig, LoggingConfig};
pub use options::GraphOptions;
pub use record::{container_name, CompositeKey, LinkContainer, Record, RecordRef};
pub use spec::{EntitySpec, ForeignKey, GraphSpec, DEFAULT_LAST_UPDATED_COLUMN};
pub use value::{Row, Value};
