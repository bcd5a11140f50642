pub mod error;
pub mod http;
pub mod ids;
pub mod retry;
pub mod source;
pub mod types;

pub use error::{SourceError, SourceResult};
pub use http::{HttpMessageSource, HttpSourceConfig};
pub use ids::{ConversationId, MessageId, SenderId};
pub use retry::{RetryNotice, RetryPolicy, fetch_with_retry};
pub use source::{Batch, BatchDirection, BatchRequest, BoxFuture, MessageSource};
pub use types::{Cursor, MessageRecord, OrderingKey};
