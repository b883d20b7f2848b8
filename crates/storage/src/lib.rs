pub mod conformance;
mod error;
mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use memory::{MemorySnapshot, MemoryStorage};
pub use record::{
    table, AttributeRecord, MoneyEventKind, MoneyEventRecord, ProfileRecord, QueryFilter,
    QueryRecord, RatingRecord, ResponseRecord,
};
pub use traits::MarketStorage;
