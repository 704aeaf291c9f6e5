//! Resume-matching pipeline, leaves first:
//! extract → chunk → embed/index → rank → score.

pub mod chunker;
pub mod embedding;
pub mod extract;
pub mod identity;
pub mod index;
pub mod prompts;
pub mod ranker;
pub mod scorer;
