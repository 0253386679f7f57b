//! Transparent frame fragmentation and reassembly.
//!
//! Frames whose payload exceeds the negotiated fragment size are split
//! into a head frame plus PAYLOAD continuations carrying the FOLLOWS
//! flag; the receiving side stitches them back together before the stream
//! layer ever sees them.

pub mod error;
pub mod fragmenter;
pub mod reassembler;

pub use error::ReassemblyError;
pub use fragmenter::Fragmenter;
pub use reassembler::Reassembler;

#[cfg(test)]
mod tests;
