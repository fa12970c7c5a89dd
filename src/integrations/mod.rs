//! External service integrations.

pub mod lightfusion {
    pub use crate::lightfusion::*;
}

pub mod genability {
    pub use crate::genability::*;
}

pub mod circuit_breaker {
    pub use crate::circuit_breaker::*;
}
