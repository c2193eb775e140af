//! Control words and default port assignments for the node/broker fabric.
//!
//! The payload frame of a packet envelope is either a serialized record or
//! one of four fixed ASCII control words. These are never confused with
//! record payloads because a control word is always the sole content of the
//! last frame and records are always length-prefixed binary (`rmp-serde`).

use bytes::Bytes;

/// Barrier-release reply from the Broker to a Node during sync.
pub const GO: &str = "GO";
/// Sentinel payload declaring no more data on a topic.
pub const END: &str = "END";
/// Broker's acknowledgment to a Producer that its `END` was observed.
pub const BYE: &str = "BYE";
/// Kill signal, multicast downstream from a Broker to its local Nodes.
pub const KILL: &str = "KILL";

/// One of the four fixed control payloads carried on the data or sync path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlWord {
    Go,
    End,
    Bye,
    Kill,
}

impl ControlWord {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Go => GO,
            Self::End => END,
            Self::Bye => BYE,
            Self::Kill => KILL,
        }
    }

    #[must_use]
    pub fn as_bytes(self) -> Bytes {
        Bytes::from_static(self.as_str().as_bytes())
    }

    /// Recognize a control word from a raw payload frame, if it exactly matches one.
    #[must_use]
    pub fn parse(payload: &[u8]) -> Option<Self> {
        match payload {
            b"GO" => Some(Self::Go),
            b"END" => Some(Self::End),
            b"BYE" => Some(Self::Bye),
            b"KILL" => Some(Self::Kill),
            _ => None,
        }
    }
}

/// Default TCP ports for the four broker-owned sockets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ports {
    /// Producers -> Broker.
    pub backend: u16,
    /// Broker -> Consumers.
    pub frontend: u16,
    /// Nodes <-> Broker sync barrier.
    pub sync: u16,
    /// Broker -> local Nodes (kill), optionally upstream Broker -> Broker.
    pub kill: u16,
}

impl Default for Ports {
    fn default() -> Self {
        Self {
            backend: 42069,
            frontend: 42070,
            sync: 42071,
            kill: 42066,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_word_roundtrips() {
        for w in [ControlWord::Go, ControlWord::End, ControlWord::Bye, ControlWord::Kill] {
            assert_eq!(ControlWord::parse(w.as_str().as_bytes()), Some(w));
        }
    }

    #[test]
    fn unrecognized_payload_is_not_a_control_word() {
        assert_eq!(ControlWord::parse(b"\x81\xa4data"), None);
    }

    #[test]
    fn default_ports_match_spec() {
        let p = Ports::default();
        assert_eq!(p.backend, 42069);
        assert_eq!(p.frontend, 42070);
        assert_eq!(p.sync, 42071);
        assert_eq!(p.kill, 42066);
    }
}
