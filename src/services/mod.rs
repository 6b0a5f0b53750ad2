pub mod anime_search;
pub mod hybrid;
pub mod metadata;
pub mod recommendations;
pub mod recommenders;

pub use metadata::{JikanProvider, MetadataProvider, StaticProvider};
pub use recommendations::RecommendationEngine;
