// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Slotted-ALOHA random access.
//!
//! Terminals transmit data packets (with replicas) on randomly chosen
//! slots; the gateway side deposits received packets into per-category
//! slot inventories, removes collisions (DSA or CRDSA), acknowledges the
//! survivors and reassembles their PDUs per terminal and QoS.

pub mod algo;
mod controller;
mod frame;
mod packet;
pub mod reassembly;
mod simulation;
mod terminal;

pub use controller::{CategoryStats, SalohaController, ScheduleOutput};
pub use frame::{SaFrame, SaFrameKind, MAX_FRAME_PAYLOAD};
pub use packet::{SaCtrlPacket, SaDataPacket, CTRL_ACK, CTRL_ERR, DATA_HEADER_LENGTH};
pub use reassembly::{PropagateState, TerminalContext, MAX_OLD_COUNTER};
pub use simulation::SlottedAlohaSimu;
pub use terminal::{SalohaTalConfig, SalohaTerminal};

/// Identifier of the PDU a data packet belongs to.
pub type PduId = u32;

/// The unique id of a data-packet replica: every replica of the same
/// packet shares it, replicas of different packets never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UniqueId {
    pub pdu_id: PduId,
    pub seq: u16,
    pub pdu_nb: u16,
    pub qos: u8,
}

impl std::fmt::Display for UniqueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}:{}", self.pdu_id, self.seq, self.pdu_nb, self.qos)
    }
}

impl std::str::FromStr for UniqueId {
    type Err = crate::Error;

    fn from_str(text: &str) -> crate::Result<Self> {
        let mut parts = text.split(':');
        let mut next = || {
            parts
                .next()
                .ok_or_else(|| crate::Error::Malformed(format!("bad unique id '{}'", text)))
        };
        let pdu_id = next()?
            .parse()
            .map_err(|_| crate::Error::Malformed(format!("bad unique id '{}'", text)))?;
        let seq = next()?
            .parse()
            .map_err(|_| crate::Error::Malformed(format!("bad unique id '{}'", text)))?;
        let pdu_nb = next()?
            .parse()
            .map_err(|_| crate::Error::Malformed(format!("bad unique id '{}'", text)))?;
        let qos = next()?
            .parse()
            .map_err(|_| crate::Error::Malformed(format!("bad unique id '{}'", text)))?;
        Ok(Self { pdu_id, seq, pdu_nb, qos })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_id_text_roundtrip() {
        let id = UniqueId { pdu_id: 42, seq: 1, pdu_nb: 3, qos: 5 };
        let text = id.to_string();
        assert_eq!(text, "42:1:3:5");
        assert_eq!(text.parse::<UniqueId>().unwrap(), id);
    }

    #[test]
    fn malformed_unique_id_rejected() {
        assert!("1:2:3".parse::<UniqueId>().is_err());
        assert!("a:b:c:d".parse::<UniqueId>().is_err());
    }
}
