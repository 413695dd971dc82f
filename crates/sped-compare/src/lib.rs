pub mod key;
pub mod result;
pub mod similarity;

pub use key::KeyComparator;
pub use result::*;
pub use similarity::{SimilarityComparator, SimilarityDivergence, SimilarityReport};
