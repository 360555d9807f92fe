//! The Feed (Transport)
//!
//! Binary quote records and the UDP subscription that delivers them.

mod subscriber;
mod wire;

pub use subscriber::{decode_events, subscription_message, FeedSubscriber};
pub use wire::{decode_datagram, decode_record, encode_record, MAX_RECORDS_PER_DATAGRAM, RECORD_SIZE};
