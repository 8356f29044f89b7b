//! # Localize
//!
//! Finds 2D-3D correspondences between a query image and a structure from motion
//! reconstruction, for a pose solver to consume.
//!
//! Query descriptors are assigned to visual words and compared with the database descriptors of
//! the same words through their Hamming embedding [`Signature`](hamming_embedding::Signature)s.
//! Each resulting [`Correspondence`] is scored from the Hamming distances of the query feature
//! and of the database point, and the distinctive ones vote for the database images that see
//! their point. The best ranked images then provide a bounded set of confident
//! correspondences, spread over the query image with a grid of quotas, plus a larger set of
//! potential correspondences.
//!
//! [`Localizer`] runs the whole pipeline. The individual stages are exposed so they can be
//! driven and inspected separately:
//!
//! 1. [`assign_words`] with a [`Vocabulary`]
//! 2. [`match_features`]
//! 3. [`score_correspondences`]
//! 4. [`cast_votes`], [`summarize_votes`] and [`rank_cameras`]
//! 5. [`boost_scores`] and [`select`]
//!
//! Everything one query accumulates lives in a [`QueryContext`], which is created for each
//! query.

mod assignments;
mod context;
mod database;
mod error;
mod export;
mod gps;
mod keyfile;
mod localizer;
mod matching;
mod query;
mod reconstruction;
mod scoring;
mod selection;
mod settings;
mod timing;
mod tokens;
mod vocabulary;
mod voting;

pub use assignments::*;
pub use context::*;
pub use database::*;
pub use error::*;
pub use export::*;
pub use gps::*;
pub use keyfile::*;
pub use localizer::*;
pub use matching::*;
pub use query::*;
pub use reconstruction::*;
pub use scoring::*;
pub use selection::*;
pub use settings::*;
pub use timing::*;
pub use vocabulary::*;
pub use voting::*;
