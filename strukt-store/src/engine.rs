#[cfg(feature = "memory")]
mod memory;
#[cfg(feature = "pg")]
mod pg;
#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "memory")]
pub use memory::*;
#[cfg(feature = "pg")]
pub use pg::*;
#[cfg(feature = "sqlite")]
pub use sqlite::*;
