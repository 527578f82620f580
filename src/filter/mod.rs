//! Row and record filtering.
//!
//! A [`Predicate`](predicate::Predicate) tree is evaluated against a
//! [`FilterContext`](context::FilterContext): a raw row, where leaves target
//! column positions or header names, or a mapped record, where leaves target
//! field names. Item readers and writers accept any [`Filter`](predicate::Filter)
//! and skip the items it rejects.

pub mod context;
pub mod predicate;
pub mod processor;
