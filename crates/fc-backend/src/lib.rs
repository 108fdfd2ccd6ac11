//! fc-backend: streaming exchange engine for feedchat.
//!
//! Turns the growing body of a chat stream response into ordered protocol
//! events and drives one request/stream exchange per `StreamSession`.

pub mod buffer;
pub mod exchange;
pub mod frame;
pub mod mock;
pub mod transport;

pub use buffer::RawBuffer;
pub use exchange::{
    ExchangeCanceller, ExchangeError, ExchangeOutcome, ExchangePhase, ExchangeState, Resolution,
    StreamSession,
};
pub use frame::{decode_frames, encode_frame, DecodedFrames};
pub use mock::{MockConfig, MockResponse, MockTransport};
pub use transport::{ByteStream, HttpTransport, Transport, TransportError};
