//! External service integrations.

pub mod geocoding {
    pub use crate::services::*;
}

pub mod storage {
    pub use crate::db_storage::*;
}
