pub mod bing;
pub mod candidates;
pub mod selector;

pub use bing::{BingImageSearch, ImageSearch};
pub use candidates::extract_candidates;
pub use selector::pick_random;
