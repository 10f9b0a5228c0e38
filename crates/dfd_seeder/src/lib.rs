pub mod listener;
pub mod seeder;
pub mod shared_files;

pub use seeder::serve_connection;
pub use shared_files::{SharedFile, SharedFiles};
