#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum PackError {
    #[error("segment shorter than its 4-byte size header ({0} byte(s))")]
    MissingHeader(usize),

    #[error("compressed stream ended at 0x{offset:X} with {produced} of {expected} byte(s) produced")]
    TruncatedStream {
        offset: usize,
        produced: usize,
        expected: usize,
    },

    #[error("back-reference at 0x{offset:X} reaches {distance} byte(s) back, only {produced} produced")]
    BadBackReference {
        offset: usize,
        distance: usize,
        produced: usize,
    },

    #[error("chunk at 0x{offset:X} overruns the declared size {expected}")]
    Overrun { offset: usize, expected: usize },

    #[error("archive too short for its index")]
    TruncatedIndex,

    #[error("first segment offset {found} does not follow the index (expected {expected})")]
    IndexMisaligned { expected: u32, found: u32 },

    #[error("segment {index} offset {offset} lies outside [{low}, {high}]")]
    SegmentOutOfOrder {
        index: usize,
        offset: u32,
        low: u32,
        high: u32,
    },

    #[error("an archive needs at least one segment")]
    Empty,

    #[error("archive exceeds 4 GiB")]
    TooLarge,
}

pub type Result<T> = std::result::Result<T, PackError>;
