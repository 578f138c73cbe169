//! Flow reconstruction: grouping endpoint-tagged packets into bidirectional
//! conversations.
//!
//! The reconstructor is a single-writer streaming component: one sequential
//! feed of [`PacketMeta`] per run, O(1) amortized per packet. Packets whose
//! unordered endpoint pair has not been seen create a new [`Flow`]; every
//! later packet for the same pair updates that flow's per-direction counters
//! regardless of which direction it travels.
//!
//! A flow's canonical `A`/`B` naming is fixed by its first packet: the
//! source endpoint of that packet becomes `A`, so "A→B" is stable for the
//! flow's lifetime.

use crate::error::{Result, SpoorError};
use crate::source::Timestamp;
use std::collections::HashMap;
use std::fmt;

/// Protocol layer a packet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolKind {
    /// TCP conversations.
    Tcp,
    /// UDP exchanges.
    Udp,
    /// ICMP message pairs.
    Icmp,
    /// Any other protocol, tagged by its numeric identifier.
    Other(u16),
}

/// An opaque endpoint identifier (address, address:port, node id, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Endpoint(Vec<u8>);

impl Endpoint {
    /// Creates an endpoint from raw identifier bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Returns the raw identifier bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns true if the identifier is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(text) => write!(f, "{text}"),
            Err(_) => {
                for byte in &self.0 {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// Per-packet metadata extracted by a format-specific decoder.
#[derive(Debug, Clone)]
pub struct PacketMeta {
    /// Protocol layer of the packet.
    pub protocol: ProtocolKind,
    /// Sending endpoint.
    pub src: Endpoint,
    /// Receiving endpoint.
    pub dst: Endpoint,
    /// Capture timestamp of the packet.
    pub timestamp: Timestamp,
    /// Payload length in bytes.
    pub byte_len: u64,
}

/// Direction of a packet relative to a flow's canonical endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowDirection {
    /// From endpoint `A` to endpoint `B`.
    AToB,
    /// From endpoint `B` to endpoint `A`.
    BToA,
}

/// A reconstructed bidirectional conversation between two endpoints.
#[derive(Debug, Clone)]
pub struct Flow {
    /// Sequential flow identifier, unique per reconstruction run.
    pub id: u32,
    /// Protocol layer of the flow.
    pub protocol: ProtocolKind,
    /// Canonical endpoint `A` (source of the flow's first packet).
    pub endpoint_a: Endpoint,
    /// Canonical endpoint `B`.
    pub endpoint_b: Endpoint,
    /// Packets seen in the `A→B` direction.
    pub packets_a_to_b: u64,
    /// Packets seen in the `B→A` direction.
    pub packets_b_to_a: u64,
    /// Bytes seen in the `A→B` direction.
    pub bytes_a_to_b: u64,
    /// Bytes seen in the `B→A` direction.
    pub bytes_b_to_a: u64,
    /// Timestamp of the flow's first packet.
    pub start_ts: Timestamp,
    /// Maximum timestamp seen on the flow.
    pub stop_ts: Timestamp,
}

impl Flow {
    /// Total packets seen in both directions.
    pub fn packet_count(&self) -> u64 {
        self.packets_a_to_b + self.packets_b_to_a
    }

    /// Total bytes seen in both directions.
    pub fn byte_count(&self) -> u64 {
        self.bytes_a_to_b + self.bytes_b_to_a
    }

    /// Flow duration in nanoseconds.
    pub fn duration(&self) -> i64 {
        self.stop_ts - self.start_ts
    }

    /// Mean `A→B` throughput in bytes per second, or `0.0` for a
    /// zero-duration flow.
    pub fn throughput_a_to_b(&self) -> f64 {
        Self::throughput(self.bytes_a_to_b, self.duration())
    }

    /// Mean `B→A` throughput in bytes per second, or `0.0` for a
    /// zero-duration flow.
    pub fn throughput_b_to_a(&self) -> f64 {
        Self::throughput(self.bytes_b_to_a, self.duration())
    }

    fn throughput(bytes: u64, duration_nanos: i64) -> f64 {
        if duration_nanos <= 0 {
            return 0.0;
        }
        bytes as f64 * 1_000_000_000.0 / duration_nanos as f64
    }
}

/// Groups a stream of packets into identified, order-preserving flows.
#[derive(Debug)]
pub struct FlowReconstructor {
    protocol: ProtocolKind,
    flows: Vec<Flow>,
    by_pair: HashMap<(Endpoint, Endpoint), usize>,
}

impl FlowReconstructor {
    /// Creates a reconstructor for the given protocol layer.
    ///
    /// Packets of any other protocol are ignored in constant time.
    pub fn new(protocol: ProtocolKind) -> Self {
        Self {
            protocol,
            flows: Vec::new(),
            by_pair: HashMap::new(),
        }
    }

    /// Returns the configured protocol filter.
    pub fn protocol(&self) -> ProtocolKind {
        self.protocol
    }

    /// Feeds one packet into the reconstruction.
    ///
    /// Packets not matching the protocol filter are ignored. The first
    /// packet of an unseen endpoint pair creates a flow with the next
    /// sequential id and fixes the pair's `A`/`B` naming.
    ///
    /// # Errors
    ///
    /// Returns [`SpoorError::EmptyEndpoint`],
    /// [`SpoorError::IdenticalEndpoints`], or
    /// [`SpoorError::ByteCountOverflow`] for a malformed packet; aggregate
    /// state is unchanged in every error case.
    pub fn add_packet(&mut self, packet: &PacketMeta) -> Result<()> {
        if packet.protocol != self.protocol {
            return Ok(());
        }
        if packet.src.is_empty() || packet.dst.is_empty() {
            return Err(SpoorError::EmptyEndpoint);
        }
        if packet.src == packet.dst {
            return Err(SpoorError::IdenticalEndpoints);
        }

        let key = Self::canonical_pair(&packet.src, &packet.dst);
        match self.by_pair.get(&key) {
            Some(&flow_index) => {
                let flow = &mut self.flows[flow_index];
                let flow_id = flow.id;
                let direction = if packet.src == flow.endpoint_a {
                    FlowDirection::AToB
                } else {
                    FlowDirection::BToA
                };

                // Validate the byte accumulation before mutating anything.
                let (bytes, packets) = match direction {
                    FlowDirection::AToB => (&mut flow.bytes_a_to_b, &mut flow.packets_a_to_b),
                    FlowDirection::BToA => (&mut flow.bytes_b_to_a, &mut flow.packets_b_to_a),
                };
                let new_bytes = bytes
                    .checked_add(packet.byte_len)
                    .ok_or(SpoorError::ByteCountOverflow { flow_id })?;

                *bytes = new_bytes;
                *packets += 1;
                flow.stop_ts = flow.stop_ts.max(packet.timestamp);
            }
            None => {
                let id = self.flows.len() as u32;
                self.flows.push(Flow {
                    id,
                    protocol: packet.protocol,
                    endpoint_a: packet.src.clone(),
                    endpoint_b: packet.dst.clone(),
                    packets_a_to_b: 1,
                    packets_b_to_a: 0,
                    bytes_a_to_b: packet.byte_len,
                    bytes_b_to_a: 0,
                    start_ts: packet.timestamp,
                    stop_ts: packet.timestamp,
                });
                self.by_pair.insert(key, id as usize);
            }
        }

        Ok(())
    }

    /// Returns the flow with the given id, if it exists.
    pub fn get_flow(&self, id: u32) -> Option<&Flow> {
        self.flows.get(id as usize)
    }

    /// Returns all flows in creation order.
    pub fn flows(&self) -> impl Iterator<Item = &Flow> {
        self.flows.iter()
    }

    /// Returns the number of reconstructed flows.
    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    /// Discards all flows and resets the id counter for an explicit re-run.
    pub fn clear(&mut self) {
        self.flows.clear();
        self.by_pair.clear();
    }

    /// Canonical unordered-pair lookup key.
    fn canonical_pair(src: &Endpoint, dst: &Endpoint) -> (Endpoint, Endpoint) {
        if src <= dst {
            (src.clone(), dst.clone())
        } else {
            (dst.clone(), src.clone())
        }
    }
}
