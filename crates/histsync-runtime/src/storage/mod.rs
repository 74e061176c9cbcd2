mod fs;

pub use fs::{atomic_write, atomic_write_json, read_json};
