use std::time::Instant;

/// An encoded frame as delivered by the source, before pacing decides its fate.
///
/// The payload is opaque: the pipeline never decodes pixel data, it only
/// inspects headers during validation.
#[derive(Clone, Debug)]
pub struct RawFrame {
    payload: Vec<u8>,
    arrival: Instant,
    sequence_hint: u64,
}

impl RawFrame {
    pub fn new(payload: Vec<u8>, arrival: Instant, sequence_hint: u64) -> Self {
        Self {
            payload,
            arrival,
            sequence_hint,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn arrival(&self) -> Instant {
        self.arrival
    }

    /// Source-assigned ack id.
    pub fn sequence_hint(&self) -> u64 {
        self.sequence_hint
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

/// A frame that survived pacing and validation.
///
/// `index` is its position in the output sequence: the Nth kept frame
/// always carries index N-1, however many raw frames were dropped before it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeptFrame {
    index: usize,
    payload: Vec<u8>,
}

impl KeptFrame {
    pub fn new(index: usize, payload: Vec<u8>) -> Self {
        Self { index, payload }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}
