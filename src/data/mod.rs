//! Data structures for expression matrices, sample metadata, and the
//! staged dataset carried through the fitting pipeline

mod dataset;
mod expression;
mod metadata;

pub use dataset::PhaseDataSet;
pub use expression::ExpressionMatrix;
pub use metadata::{check_alignment_lengths, SampleMetadata};
