pub mod guard;
pub mod rate_limit;
pub mod response;

pub use guard::{require_identity, require_self};
pub use rate_limit::{rate_limit, LimitedRoute};
pub use response::{envelope_bytes, ApiResponse, ApiResult, CachedJson};
