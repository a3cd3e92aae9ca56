//! scn-pack
//!
//! The container layer around script blobs: an LZ segment codec ([`lz`]) and
//! the indexed archive that holds the segments ([`archive`]). [`pack`] moves
//! whole archives to and from a directory of numbered files.

pub mod archive;
pub mod error;
pub mod lz;
pub mod pack;

pub use error::{PackError, Result};
pub use lz::Mode;
pub use pack::{pack_from_dir, unpack_to_dir, MetaEntry};
