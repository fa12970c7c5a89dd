// Domain-layer modules and shared errors/models
pub mod lead_service {
    pub use crate::lead_service::*;
}

pub mod quote {
    pub use crate::quote::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
