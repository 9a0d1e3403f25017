//! Decoder and encoder adapters plus the decoded-audio type they exchange

pub mod decoder;
pub mod encoder;
pub mod types;

pub use decoder::{AudioDecoder, SymphoniaDecoder};
pub use encoder::{SegmentEncoder, WavSegmentEncoder};
pub use types::DecodedAudio;
