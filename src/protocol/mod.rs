//! RouterOS API wire protocol
//!
//! The API is a request/response protocol with push streams, carried over a
//! single TCP connection:
//!
//! ```text
//! Client                                         Device
//!   |-- /login =name=.. =password=.. .tag=1 ------>|
//!   |<------------------------------ !done .tag=1 -|
//!   |-- /interface/monitor-traffic =interface=.. --|
//!   |   .tag=2 ----------------------------------->|
//!   |<--------------------------- !re .tag=2 (1s) -|
//!   |<--------------------------- !re .tag=2 (1s) -|
//!   |-- /cancel =tag=2 .tag=3 -------------------->|
//!   |<------------------------ !trap .tag=2 -------|
//!   |<------------------------ !done .tag=2 -------|
//!   |<------------------------ !done .tag=3 -------|
//! ```
//!
//! Sentences are lists of length-prefixed words ended by an empty word.
//! Tags let many commands share the connection concurrently.

pub mod codec;
pub mod command;
pub mod constants;
pub mod error;
pub mod reply;
pub mod sentence;
pub mod word;

pub use codec::SentenceCodec;
pub use command::Command;
pub use error::ProtocolError;
pub use reply::{Attributes, Reply, ReplyKind, ReplySentence};
pub use sentence::Sentence;
