//! Persistence.

pub mod db {
    pub use crate::db::*;
}

pub mod repo {
    pub use crate::repo::*;
}

pub mod memory_store {
    pub use crate::memory_store::*;
}
