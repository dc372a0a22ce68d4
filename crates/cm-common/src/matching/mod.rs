pub mod index;
pub mod pipeline;
pub mod ranker;

pub use index::SimilarityIndex;
pub use pipeline::{PipelineConfig, RankingError, RankingOutcome, RankingPipeline, RunGuard};
pub use ranker::{RankWeights, RankedCandidate, RankerConfig, ScoredCandidate};
