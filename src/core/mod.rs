use rand::distr::{Alphanumeric, SampleString};

/// Item reader, processor and writer traits.
pub mod item;

/// Chunk-oriented step moving items from a reader to a writer.
pub mod step;

/// Generates a random name consisting of alphanumeric characters.
fn build_name() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), 8)
}
