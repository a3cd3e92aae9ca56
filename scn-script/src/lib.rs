//! scn-script
//!
//! Table-driven codec for SCN script blobs: a flat stream of variable-length
//! records, each identified by the longest byte signature that matches.
//!
//! The crate knows nothing about a particular game. A [`config::ScriptTable`]
//! supplies the signatures, field grammars, which fields hold offsets and the
//! text encoding. [`decode::Decoder`] turns a blob into [`record::Record`]s,
//! and [`relocate::Reassembler`] writes an edited list back with every
//! reference rewritten to the new layout.

pub mod config;
pub mod decode;
pub mod edit;
pub mod encode;
pub mod error;
pub mod primitives;
pub mod record;
pub mod relocate;
pub mod signature;
pub mod value;

pub use config::ScriptTable;
pub use decode::{Decoded, Decoder, Halt};
pub use edit::LineBreakRule;
pub use encode::{Encoded, Encoder, OffsetMap};
pub use error::{Result, ScriptError};
pub use record::Record;
pub use relocate::{Reassembler, ReferenceRule, ReferenceTable};
pub use signature::{FieldDecoder, Signature, SignatureTable};
pub use value::{TaggedValue, ValueKind};
