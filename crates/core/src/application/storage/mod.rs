// Document storage layout and dedup

pub mod organizer;
pub mod path;

pub use organizer::{sha256_hex, StorageOrganizer, StoreOutcome, SupersededMarker};
pub use path::build_path;
