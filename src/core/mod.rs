// Domain-layer modules and shared errors/models
pub mod aggregation {
    pub use crate::aggregation::*;
}

pub mod resolver {
    pub use crate::resolver::*;
}

pub mod recency {
    pub use crate::recency::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
