use thiserror::Error;

/// Errors surfaced by the convenience, `Result`-returning layer over the
/// VM's sentinel-based core API.
///
/// The spec-mandated host operations (`peek`, `poke`, `run`, `write_h16`,
/// ...) keep their documented sentinel returns (`0xFFFF`, `false`, status
/// codes) exactly as described by the original interface, since that
/// contract is part of the tested surface. This type exists for the few
/// places a `Result` is the natural Rust shape for reporting *why* an
/// operation on untrusted, host-supplied data failed: H16 text and snapshot
/// buffers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Vm16Error {
    #[error("H16 line {line} is malformed: {reason}")]
    MalformedH16Line { line: usize, reason: &'static str },

    #[error("H16 stream ended without a :00000FF terminator")]
    MissingH16Terminator,

    #[error("snapshot buffer has {actual} bytes, expected {expected}")]
    SnapshotSizeMismatch { expected: usize, actual: usize },

    #[error("snapshot text contains a non-hex character at byte offset {offset}")]
    InvalidSnapshotHex { offset: usize },

    #[error("snapshot header does not identify a VM16 image")]
    NotAVm16Image,

    #[error("snapshot was produced by an incompatible VM16 version (got {got}, expected {expected})")]
    IncompatibleVersion { got: u16, expected: u16 },
}
