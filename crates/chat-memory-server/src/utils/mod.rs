pub mod error;
pub mod similarity;

pub use error::{ApiError, MemoryError};
pub use similarity::cosine_similarity;
