//! Bridges between the burst bus and the simple bus.
//!
//! The burst bus carries tagged transactions of up to [`MAX_BURST_BEATS`]
//! beats; the simple bus carries exactly one single-beat transaction at a
//! time. Two adapters translate between them:
//!
//! - [`BurstToSimple`] decomposes a burst into sequential simple beats.
//! - [`SimpleToBurst`] wraps each simple request as a one-beat burst tagged
//!   with [`RESERVED_ID`].
//!
//! # Burst decomposition
//!
//! ```text
//!  burst side                    bridge                     simple side
//!  ──────────                    ──────                     ───────────
//!  issue(id=3, 0x100, 16B) ──►  ┌────────────┐
//!                               │ in-flight  │ ── beat 0 @0x100 ──►
//!                               │  slot (1)  │ ◄── ack ───────────
//!  ◄── take_response() ──────── │ response   │
//!                               │  slot (1)  │ ── beat 1 @0x104 ──►
//!                               └────────────┘        ...
//! ```
//!
//! The next beat is only presented on the simple side once the previous
//! beat's response has been consumed upstream, so responses always leave the
//! bridge in issue order. Issuing a new burst while one is in flight is a
//! protocol violation: the bridge has a single transaction slot and relies
//! on its master to honor [`BurstToSimple::can_accept`].

use smallvec::SmallVec;
use thiserror::Error;

use super::Protocol;

/// Burst length limit (16 beats, as on AXI3 ports).
pub const MAX_BURST_BEATS: usize = 16;

/// Tag carried by every burst produced from a simple request.
pub const RESERVED_ID: u16 = 0;

/// Bursts may not cross this boundary.
pub const BURST_BOUNDARY: u64 = 4096;

/// Address sequencing of a burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurstKind {
    /// Every beat targets the same address (FIFO-style registers)
    Fixed,
    /// Each beat advances by the data width
    Incr,
}

/// Response status, shared by both buses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusResponse {
    Okay,
    SlaveError,
    DecodeError,
}

impl BusResponse {
    pub fn is_ok(&self) -> bool {
        matches!(self, BusResponse::Okay)
    }
}

/// One single-beat transaction on the simple bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimpleRequest {
    /// Byte address
    pub addr: u64,
    /// Write data, `None` for reads
    pub write: Option<u64>,
}

impl SimpleRequest {
    pub fn read(addr: u64) -> Self {
        Self { addr, write: None }
    }

    pub fn write(addr: u64, data: u64) -> Self {
        Self { addr, write: Some(data) }
    }

    pub fn is_write(&self) -> bool {
        self.write.is_some()
    }
}

/// Acknowledge of a simple-bus transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimpleResponse {
    /// Read data (ignored for writes)
    pub data: u64,
    pub status: BusResponse,
}

impl SimpleResponse {
    pub fn ok(data: u64) -> Self {
        Self { data, status: BusResponse::Okay }
    }

    /// Write acknowledge.
    pub fn ack() -> Self {
        Self::ok(0)
    }

    pub fn error() -> Self {
        Self { data: 0, status: BusResponse::SlaveError }
    }
}

/// Direction and payload of a burst.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BurstOp {
    Read,
    /// One data word per beat
    Write(SmallVec<[u64; MAX_BURST_BEATS]>),
}

/// A tagged burst request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurstRequest {
    /// Transaction tag
    pub id: u16,
    /// Address of the first beat
    pub addr: u64,
    /// Total transfer size in bytes
    pub len_bytes: u64,
    pub kind: BurstKind,
    pub op: BurstOp,
}

impl BurstRequest {
    pub fn read(id: u16, addr: u64, len_bytes: u64, kind: BurstKind) -> Self {
        Self { id, addr, len_bytes, kind, op: BurstOp::Read }
    }

    pub fn write(
        id: u16,
        addr: u64,
        len_bytes: u64,
        kind: BurstKind,
        data: impl IntoIterator<Item = u64>,
    ) -> Self {
        Self { id, addr, len_bytes, kind, op: BurstOp::Write(data.into_iter().collect()) }
    }

    pub fn is_write(&self) -> bool {
        matches!(self.op, BurstOp::Write(_))
    }
}

/// Response to one beat of a burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeatResponse {
    /// Tag of the burst this beat belongs to
    pub id: u16,
    /// Address the beat targeted
    pub addr: u64,
    /// Read data, `None` for write acknowledges
    pub data: Option<u64>,
    pub status: BusResponse,
    /// Final beat of the burst
    pub last: bool,
}

/// Errors raised by the bridges.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Burst address or size not a multiple of the data width.
    #[error("burst at 0x{addr:08x} of {len_bytes} bytes is not aligned to the {data_bytes}-byte data width")]
    Alignment { addr: u64, len_bytes: u64, data_bytes: u64 },

    #[error("burst of {beats} beats exceeds the {max}-beat limit")]
    BurstTooLong { beats: u64, max: usize },

    #[error("burst at 0x{addr:08x} of {len_bytes} bytes crosses a 4 KiB boundary")]
    BoundaryCrossing { addr: u64, len_bytes: u64 },

    /// The upstream or downstream side broke the handshake.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    #[error("response tagged {got} does not match in-flight tag {expected}")]
    UnexpectedResponse { expected: u16, got: u16 },
}

/// Burst currently being decomposed.
#[derive(Debug, Clone)]
struct InFlight {
    id: u16,
    base: u64,
    kind: BurstKind,
    beats: u32,
    /// Beats presented on the simple side so far
    issued: u32,
    /// A beat is waiting for its simple-side acknowledge
    beat_outstanding: bool,
    write_data: Option<SmallVec<[u64; MAX_BURST_BEATS]>>,
}

impl InFlight {
    fn beat_addr(&self, beat: u32, data_bytes: u64) -> u64 {
        match self.kind {
            BurstKind::Fixed => self.base,
            BurstKind::Incr => self.base + u64::from(beat) * data_bytes,
        }
    }
}

/// Adapter from a burst-bus master to a simple-bus slave.
#[derive(Debug, Clone)]
pub struct BurstToSimple {
    data_bytes: u64,
    in_flight: Option<InFlight>,
    /// Response for the most recent beat, not yet consumed upstream
    response: Option<BeatResponse>,
}

impl BurstToSimple {
    /// Create a bridge for a data path of `data_width` bits.
    pub fn new(data_width: u32) -> Self {
        Self {
            data_bytes: u64::from(data_width / 8).max(1),
            in_flight: None,
            response: None,
        }
    }

    /// Single-slot back-pressure: a new burst may be issued.
    pub fn can_accept(&self) -> bool {
        self.in_flight.is_none()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.response.is_none()
    }

    /// Accept a burst from the master.
    pub fn issue(&mut self, req: BurstRequest) -> Result<(), BridgeError> {
        if !self.can_accept() {
            return Err(BridgeError::ProtocolViolation("burst issued while another is in flight"));
        }

        let data_bytes = self.data_bytes;
        if req.len_bytes == 0 || req.addr % data_bytes != 0 || req.len_bytes % data_bytes != 0 {
            return Err(BridgeError::Alignment {
                addr: req.addr,
                len_bytes: req.len_bytes,
                data_bytes,
            });
        }

        let beats = req.len_bytes / data_bytes;
        if beats > MAX_BURST_BEATS as u64 {
            return Err(BridgeError::BurstTooLong { beats, max: MAX_BURST_BEATS });
        }

        if req.kind == BurstKind::Incr {
            let last = req.addr.checked_add(req.len_bytes - 1);
            if last.map_or(true, |last| last / BURST_BOUNDARY != req.addr / BURST_BOUNDARY) {
                return Err(BridgeError::BoundaryCrossing { addr: req.addr, len_bytes: req.len_bytes });
            }
        }

        let write_data = match req.op {
            BurstOp::Read => None,
            BurstOp::Write(data) => {
                if data.len() as u64 != beats {
                    return Err(BridgeError::ProtocolViolation(
                        "write data beats do not match burst length",
                    ));
                }
                Some(data)
            }
        };

        log::trace!(
            "BurstToSimple: accept id={} addr=0x{:08X} beats={} {:?} {}",
            req.id,
            req.addr,
            beats,
            req.kind,
            if write_data.is_some() { "write" } else { "read" }
        );

        self.in_flight = Some(InFlight {
            id: req.id,
            base: req.addr,
            kind: req.kind,
            beats: beats as u32,
            issued: 0,
            beat_outstanding: false,
            write_data,
        });
        Ok(())
    }

    /// Simple-side request for the next beat, if one may be presented now.
    ///
    /// Returns `None` while a beat is waiting for its acknowledge, while the
    /// previous beat's response has not been consumed, or when idle.
    pub fn poll_request(&mut self) -> Option<SimpleRequest> {
        if self.response.is_some() {
            return None;
        }
        let data_bytes = self.data_bytes;
        let flight = self.in_flight.as_mut()?;
        if flight.beat_outstanding || flight.issued == flight.beats {
            return None;
        }

        let beat = flight.issued;
        let addr = flight.beat_addr(beat, data_bytes);
        let write = flight.write_data.as_ref().map(|data| data[beat as usize]);
        flight.issued += 1;
        flight.beat_outstanding = true;

        log::trace!("BurstToSimple: beat {}/{} @0x{:08X}", beat + 1, flight.beats, addr);
        Some(SimpleRequest { addr, write })
    }

    /// Acknowledge from the simple side for the outstanding beat.
    pub fn complete(&mut self, resp: SimpleResponse) -> Result<(), BridgeError> {
        let data_bytes = self.data_bytes;
        let flight = self
            .in_flight
            .as_mut()
            .ok_or(BridgeError::ProtocolViolation("response with no burst in flight"))?;
        if !flight.beat_outstanding {
            return Err(BridgeError::ProtocolViolation("response without an outstanding beat"));
        }

        let beat = flight.issued - 1;
        flight.beat_outstanding = false;
        self.response = Some(BeatResponse {
            id: flight.id,
            addr: flight.beat_addr(beat, data_bytes),
            data: if flight.write_data.is_some() { None } else { Some(resp.data) },
            status: resp.status,
            last: flight.issued == flight.beats,
        });
        Ok(())
    }

    /// Hand the next in-order beat response to the master.
    ///
    /// Consuming the last beat frees the transaction slot.
    pub fn take_response(&mut self) -> Option<BeatResponse> {
        let resp = self.response.take()?;
        if resp.last {
            log::trace!("BurstToSimple: burst id={} complete", resp.id);
            self.in_flight = None;
        }
        Some(resp)
    }

    /// Run a whole burst against a simple-bus slave.
    pub fn transact<F>(&mut self, req: BurstRequest, mut slave: F) -> Result<Vec<BeatResponse>, BridgeError>
    where
        F: FnMut(&SimpleRequest) -> SimpleResponse,
    {
        self.issue(req)?;
        let mut responses = Vec::new();
        while let Some(beat) = self.poll_request() {
            self.complete(slave(&beat))?;
            if let Some(resp) = self.take_response() {
                let last = resp.last;
                responses.push(resp);
                if last {
                    break;
                }
            }
        }
        Ok(responses)
    }
}

/// Adapter from a simple-bus master to a burst-bus slave.
#[derive(Debug, Clone)]
pub struct SimpleToBurst {
    data_bytes: u64,
    outstanding: Option<SimpleRequest>,
}

impl SimpleToBurst {
    pub fn new(data_width: u32) -> Self {
        Self { data_bytes: u64::from(data_width / 8).max(1), outstanding: None }
    }

    pub fn is_idle(&self) -> bool {
        self.outstanding.is_none()
    }

    /// Wrap a simple request as a single-beat burst.
    pub fn issue(&mut self, req: SimpleRequest) -> Result<BurstRequest, BridgeError> {
        if self.outstanding.is_some() {
            return Err(BridgeError::ProtocolViolation("request issued while another is outstanding"));
        }
        if req.addr % self.data_bytes != 0 {
            return Err(BridgeError::Alignment {
                addr: req.addr,
                len_bytes: self.data_bytes,
                data_bytes: self.data_bytes,
            });
        }

        self.outstanding = Some(req);
        let burst = match req.write {
            Some(data) => BurstRequest::write(RESERVED_ID, req.addr, self.data_bytes, BurstKind::Incr, [data]),
            None => BurstRequest::read(RESERVED_ID, req.addr, self.data_bytes, BurstKind::Incr),
        };
        log::trace!("SimpleToBurst: wrap @0x{:08X} {}", req.addr, if req.is_write() { "write" } else { "read" });
        Ok(burst)
    }

    /// Unwrap the burst-side response of the outstanding request.
    pub fn complete(&mut self, resp: BeatResponse) -> Result<SimpleResponse, BridgeError> {
        if self.outstanding.is_none() {
            return Err(BridgeError::ProtocolViolation("response with no request outstanding"));
        }
        if resp.id != RESERVED_ID {
            return Err(BridgeError::UnexpectedResponse { expected: RESERVED_ID, got: resp.id });
        }
        if !resp.last {
            return Err(BridgeError::ProtocolViolation("multi-beat response to a single-beat burst"));
        }
        self.outstanding = None;
        Ok(SimpleResponse { data: resp.data.unwrap_or(0), status: resp.status })
    }

    /// Run one simple request against a burst-bus slave.
    pub fn transact<F>(&mut self, req: SimpleRequest, slave: F) -> Result<SimpleResponse, BridgeError>
    where
        F: FnOnce(&BurstRequest) -> BeatResponse,
    {
        let burst = self.issue(req)?;
        self.complete(slave(&burst))
    }
}

/// Which direction a bridge converts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeKind {
    BurstToSimple,
    SimpleToBurst,
}

/// Description of a bridge inserted by the fabric.
///
/// The fabric is immutable once finalized; each evaluator that drives
/// traffic through a bridged port instantiates its own bridge from this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeSpec {
    pub kind: BridgeKind,
    /// Data width in bits
    pub data_width: u32,
}

impl BridgeSpec {
    /// Bridge needed between a port speaking `from` and a bus speaking `to`.
    pub fn between(from: Protocol, to: Protocol, data_width: u32) -> Option<Self> {
        let kind = match (from, to) {
            (Protocol::BurstBus, Protocol::SimpleBus) => BridgeKind::BurstToSimple,
            (Protocol::SimpleBus, Protocol::BurstBus) => BridgeKind::SimpleToBurst,
            _ => return None,
        };
        Some(Self { kind, data_width })
    }

    pub fn instantiate(&self) -> Bridge {
        match self.kind {
            BridgeKind::BurstToSimple => Bridge::BurstToSimple(BurstToSimple::new(self.data_width)),
            BridgeKind::SimpleToBurst => Bridge::SimpleToBurst(SimpleToBurst::new(self.data_width)),
        }
    }
}

/// A live bridge instance.
#[derive(Debug, Clone)]
pub enum Bridge {
    BurstToSimple(BurstToSimple),
    SimpleToBurst(SimpleToBurst),
}

impl Bridge {
    pub fn kind(&self) -> BridgeKind {
        match self {
            Bridge::BurstToSimple(_) => BridgeKind::BurstToSimple,
            Bridge::SimpleToBurst(_) => BridgeKind::SimpleToBurst,
        }
    }

    pub fn is_idle(&self) -> bool {
        match self {
            Bridge::BurstToSimple(b) => b.is_idle(),
            Bridge::SimpleToBurst(b) => b.is_idle(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Simple-bus memory returning the address as data.
    fn echo(req: &SimpleRequest) -> SimpleResponse {
        match req.write {
            Some(_) => SimpleResponse::ack(),
            None => SimpleResponse::ok(req.addr),
        }
    }

    #[test]
    fn test_burst_decomposes_in_order() {
        let mut bridge = BurstToSimple::new(32);
        bridge.issue(BurstRequest::read(5, 0x100, 16, BurstKind::Incr)).unwrap();

        let mut seen = Vec::new();
        for _ in 0..4 {
            let beat = bridge.poll_request().unwrap();
            // No second beat until this one is acknowledged and consumed
            assert!(bridge.poll_request().is_none());
            bridge.complete(echo(&beat)).unwrap();
            assert!(bridge.poll_request().is_none());

            let resp = bridge.take_response().unwrap();
            assert_eq!(resp.id, 5);
            seen.push((resp.addr, resp.data, resp.last));
        }

        assert_eq!(
            seen,
            vec![
                (0x100, Some(0x100), false),
                (0x104, Some(0x104), false),
                (0x108, Some(0x108), false),
                (0x10C, Some(0x10C), true),
            ]
        );
        assert!(bridge.is_idle());
        assert!(bridge.poll_request().is_none());
    }

    #[test]
    fn test_second_burst_while_in_flight_is_violation() {
        let mut bridge = BurstToSimple::new(32);
        bridge.issue(BurstRequest::read(1, 0x100, 16, BurstKind::Incr)).unwrap();
        assert!(!bridge.can_accept());

        let err = bridge.issue(BurstRequest::read(2, 0x200, 4, BurstKind::Incr)).unwrap_err();
        assert!(matches!(err, BridgeError::ProtocolViolation(_)));

        // Still violation mid-burst, after some beats completed
        let beat = bridge.poll_request().unwrap();
        bridge.complete(echo(&beat)).unwrap();
        bridge.take_response().unwrap();
        assert!(bridge.issue(BurstRequest::read(2, 0x200, 4, BurstKind::Incr)).is_err());
    }

    #[test]
    fn test_slot_freed_after_last_response_consumed() {
        let mut bridge = BurstToSimple::new(32);
        bridge.issue(BurstRequest::read(1, 0x40, 4, BurstKind::Incr)).unwrap();
        let beat = bridge.poll_request().unwrap();
        bridge.complete(echo(&beat)).unwrap();

        // Response produced but not consumed: slot still held
        assert!(!bridge.can_accept());
        assert!(bridge.take_response().unwrap().last);
        assert!(bridge.can_accept());
        bridge.issue(BurstRequest::read(2, 0x80, 8, BurstKind::Incr)).unwrap();
    }

    #[test]
    fn test_alignment_errors() {
        let mut bridge = BurstToSimple::new(32);

        let err = bridge.issue(BurstRequest::read(0, 0x102, 8, BurstKind::Incr)).unwrap_err();
        assert_eq!(err, BridgeError::Alignment { addr: 0x102, len_bytes: 8, data_bytes: 4 });

        let err = bridge.issue(BurstRequest::read(0, 0x100, 6, BurstKind::Incr)).unwrap_err();
        assert!(matches!(err, BridgeError::Alignment { .. }));

        let err = bridge.issue(BurstRequest::read(0, 0x100, 0, BurstKind::Incr)).unwrap_err();
        assert!(matches!(err, BridgeError::Alignment { .. }));

        // Rejected bursts do not occupy the slot
        assert!(bridge.can_accept());
    }

    #[test]
    fn test_burst_limits() {
        let mut bridge = BurstToSimple::new(32);
        let err = bridge.issue(BurstRequest::read(0, 0x0, 17 * 4, BurstKind::Incr)).unwrap_err();
        assert_eq!(err, BridgeError::BurstTooLong { beats: 17, max: MAX_BURST_BEATS });

        let err = bridge.issue(BurstRequest::read(0, 0xFF8, 16, BurstKind::Incr)).unwrap_err();
        assert!(matches!(err, BridgeError::BoundaryCrossing { .. }));

        // Fixed bursts never advance, so they cannot cross
        bridge.issue(BurstRequest::read(0, 0xFFC, 16, BurstKind::Fixed)).unwrap();
    }

    #[test]
    fn test_fixed_burst_repeats_address() {
        let mut bridge = BurstToSimple::new(32);
        let responses = bridge
            .transact(BurstRequest::read(3, 0x2000, 12, BurstKind::Fixed), echo)
            .unwrap();
        let addrs: Vec<u64> = responses.iter().map(|r| r.addr).collect();
        assert_eq!(addrs, vec![0x2000, 0x2000, 0x2000]);
        assert!(responses[2].last);
    }

    #[test]
    fn test_write_burst_carries_data() {
        let mut bridge = BurstToSimple::new(32);
        let mut writes = Vec::new();
        let responses = bridge
            .transact(
                BurstRequest::write(7, 0x300, 8, BurstKind::Incr, [0xAAAA, 0xBBBB]),
                |req| {
                    writes.push((req.addr, req.write));
                    SimpleResponse::ack()
                },
            )
            .unwrap();

        assert_eq!(writes, vec![(0x300, Some(0xAAAA)), (0x304, Some(0xBBBB))]);
        assert_eq!(responses.len(), 2);
        assert!(responses.iter().all(|r| r.data.is_none() && r.id == 7));
    }

    #[test]
    fn test_write_data_length_mismatch() {
        let mut bridge = BurstToSimple::new(32);
        let err = bridge
            .issue(BurstRequest::write(0, 0x0, 12, BurstKind::Incr, [1, 2]))
            .unwrap_err();
        assert!(matches!(err, BridgeError::ProtocolViolation(_)));
    }

    #[test]
    fn test_error_status_propagates() {
        let mut bridge = BurstToSimple::new(32);
        let responses = bridge
            .transact(BurstRequest::read(0, 0x0, 8, BurstKind::Incr), |req| {
                if req.addr == 0x4 {
                    SimpleResponse::error()
                } else {
                    SimpleResponse::ok(1)
                }
            })
            .unwrap();
        assert_eq!(responses[0].status, BusResponse::Okay);
        assert_eq!(responses[1].status, BusResponse::SlaveError);
    }

    #[test]
    fn test_spurious_simple_ack() {
        let mut bridge = BurstToSimple::new(32);
        assert!(bridge.complete(SimpleResponse::ack()).is_err());

        bridge.issue(BurstRequest::read(0, 0x0, 4, BurstKind::Incr)).unwrap();
        // Ack before the beat was presented
        assert!(bridge.complete(SimpleResponse::ack()).is_err());
    }

    #[test]
    fn test_simple_to_burst_wraps_single_beat() {
        let mut bridge = SimpleToBurst::new(32);
        let burst = bridge.issue(SimpleRequest::write(0x8000_0010, 0x55)).unwrap();
        assert_eq!(burst.id, RESERVED_ID);
        assert_eq!(burst.len_bytes, 4);
        assert_eq!(burst.op, BurstOp::Write(SmallVec::from_slice(&[0x55])));

        // Single outstanding request
        assert!(bridge.issue(SimpleRequest::read(0x8000_0014)).is_err());

        let resp = bridge
            .complete(BeatResponse {
                id: RESERVED_ID,
                addr: 0x8000_0010,
                data: None,
                status: BusResponse::Okay,
                last: true,
            })
            .unwrap();
        assert_eq!(resp, SimpleResponse::ack());
        assert!(bridge.is_idle());
    }

    #[test]
    fn test_simple_to_burst_rejects_foreign_tag() {
        let mut bridge = SimpleToBurst::new(32);
        bridge.issue(SimpleRequest::read(0x10)).unwrap();
        let err = bridge
            .complete(BeatResponse { id: 9, addr: 0x10, data: Some(1), status: BusResponse::Okay, last: true })
            .unwrap_err();
        assert_eq!(err, BridgeError::UnexpectedResponse { expected: RESERVED_ID, got: 9 });
    }

    #[test]
    fn test_simple_to_burst_misaligned_request() {
        let mut bridge = SimpleToBurst::new(32);
        let err = bridge.issue(SimpleRequest::read(0x8000_0012)).unwrap_err();
        assert_eq!(
            err,
            BridgeError::Alignment { addr: 0x8000_0012, len_bytes: 4, data_bytes: 4 }
        );
        // Rejected requests leave the bridge free
        assert!(bridge.is_idle());
        assert!(bridge.issue(SimpleRequest::read(0x8000_0010)).is_ok());
    }

    #[test]
    fn test_simple_to_burst_rejects_multi_beat_response() {
        let mut bridge = SimpleToBurst::new(32);
        bridge.issue(SimpleRequest::read(0x20)).unwrap();
        let err = bridge
            .complete(BeatResponse { id: RESERVED_ID, addr: 0x20, data: Some(7), status: BusResponse::Okay, last: false })
            .unwrap_err();
        assert!(matches!(err, BridgeError::ProtocolViolation(_)));
        assert!(!bridge.is_idle());

        let resp = bridge
            .complete(BeatResponse { id: RESERVED_ID, addr: 0x20, data: Some(7), status: BusResponse::Okay, last: true })
            .unwrap();
        assert_eq!(resp, SimpleResponse::ok(7));
    }

    #[test]
    fn test_round_trip_through_both_bridges() {
        // Simple master -> burst slave that is itself decomposed back to simple
        let mut down = SimpleToBurst::new(32);
        let resp = down
            .transact(SimpleRequest::read(0x44), |burst| {
                let mut up = BurstToSimple::new(32);
                let beats = up.transact(burst.clone(), echo).unwrap();
                beats[0]
            })
            .unwrap();
        assert_eq!(resp, SimpleResponse::ok(0x44));
    }

    #[test]
    fn test_bridge_spec_selection() {
        assert_eq!(BridgeSpec::between(Protocol::SimpleBus, Protocol::SimpleBus, 32), None);
        let desc = BridgeSpec::between(Protocol::BurstBus, Protocol::SimpleBus, 32).unwrap();
        assert_eq!(desc.kind, BridgeKind::BurstToSimple);
        let bridge = desc.instantiate();
        assert_eq!(bridge.kind(), BridgeKind::BurstToSimple);
        assert!(bridge.is_idle());
    }
}
