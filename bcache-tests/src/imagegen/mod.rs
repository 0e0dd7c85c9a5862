pub mod generators;
mod utils;

pub use self::utils::get_disk;
