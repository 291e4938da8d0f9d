//! Authorization: grant/deny resolution and list-query narrowing.

mod filter;
mod resolver;

pub use filter::list_filter;
pub use resolver::{authorize, AccessGrant, AccessSettings};
