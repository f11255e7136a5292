pub mod base;
pub mod memory_store;
pub mod reader;
pub mod rest_store;

pub use base::{create_profile_store, ProfileStore};
pub use memory_store::MemoryProfileStore;
pub use reader::ProfileReader;
pub use rest_store::RestProfileStore;
