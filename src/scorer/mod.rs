pub mod keywords;
pub mod relevance;

pub use keywords::{KeywordTable, KeywordTier};
pub use relevance::{ranking, RelevanceScorer};
