//! See [`Node`] for more details.

use core::sync::atomic::{fence, Ordering};

use arrayvec::ArrayVec;
use heapless::spsc::Producer;
use log::{debug, trace, warn};
use snafu::ensure;

use crate::decoder::{Decoder, FrameError, Step};
use crate::frame::{ChecksumPolicy, Frame, Response, RESPONSE_WIRE_MAX};
use crate::hal::{BusDirection, BusHal};
use crate::types::{
    Address, DisabledSnafu, Error, IntoAddress, InvalidAddressSnafu, TransmitterBusySnafu,
};

/// Default safety-net window, in timer ticks.
const DEFAULT_SAFETY_NET_WINDOW: u16 = 2;

/// Node configuration.
///
/// The only mandatory setting is the node's own bus address; the rest
/// default to the common case (computed XOR checksums, local echo on the
/// receive line, node enabled).
#[derive(Debug, Copy, Clone)]
pub struct Config {
    address: Address,
    checksum: ChecksumPolicy,
    safety_net_window: u16,
    local_echo: bool,
    enabled: bool,
}

impl Config {
    /// Create a configuration for the given node address.
    /// # Errors
    /// Returns [`Error::InvalidAddress`] if `address` isn't an assignable
    /// node address (the broadcast address 0 is not).
    pub fn new(address: impl IntoAddress) -> Result<Self, Error> {
        let address = address.into_address()?;
        ensure!(!address.is_broadcast(), InvalidAddressSnafu);
        Ok(Self {
            address,
            checksum: ChecksumPolicy::Xor,
            safety_net_window: DEFAULT_SAFETY_NET_WINDOW,
            local_echo: true,
            enabled: true,
        })
    }

    /// Select the checksum policy for both directions.
    pub const fn checksum(mut self, policy: ChecksumPolicy) -> Self {
        self.checksum = policy;
        self
    }

    /// Number of [`Node::on_timer_tick`] calls a partially received frame
    /// may stall before the safety net abandons it.
    pub const fn safety_net_window(mut self, ticks: u16) -> Self {
        self.safety_net_window = ticks;
        self
    }

    /// Whether the transceiver feeds our own transmissions back on the
    /// receive line. True for two-wire RS-485.
    pub const fn local_echo(mut self, echo: bool) -> Self {
        self.local_echo = echo;
        self
    }

    /// A disabled node keeps its decoder synchronized to the bus but
    /// neither surfaces requests nor transmits.
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// The configured node address.
    pub const fn address(&self) -> Address {
        self.address
    }
}

/// Diagnostic counters, readable through [`Node::stats`].
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Stats {
    /// Frames addressed to this node (or broadcast) and accepted.
    pub frames_received: u32,
    /// Frames parsed for bus synchronization but meant for another node.
    pub frames_ignored: u32,
    /// Non-empty frames discarded on a checksum mismatch.
    pub checksum_errors: u32,
    /// Frames discarded because the length byte was out of range.
    pub malformed_length: u32,
    /// Bytes skipped while hunting for the start of a frame.
    pub sync_errors: u32,
    /// Partially received frames abandoned by the safety net.
    pub safety_net_recoveries: u32,
    /// `begin_transmit` calls rejected because a job was in flight.
    pub tx_faults: u32,
    /// Accepted requests dropped because the hand-off queue was full.
    pub requests_dropped: u32,
}

fn bump(counter: &mut u32) {
    *counter = counter.wrapping_add(1);
}

/// An in-flight transmission.
#[derive(Debug)]
struct TxJob {
    data: ArrayVec<u8, RESPONSE_WIRE_MAX>,
    loaded: usize,
    echo_pending: bool,
}

impl TxJob {
    fn fully_loaded(&self) -> bool {
        self.loaded == self.data.len()
    }
}

/// Single point of truth for the transceiver direction pin.
#[derive(Debug)]
struct DirectionControl {
    current: BusDirection,
}

impl DirectionControl {
    fn new(hal: &mut impl BusHal) -> Self {
        hal.set_direction(BusDirection::Receive);
        Self {
            current: BusDirection::Receive,
        }
    }

    fn enable_transmit(&mut self, hal: &mut impl BusHal) {
        if self.current != BusDirection::Transmit {
            hal.set_direction(BusDirection::Transmit);
            self.current = BusDirection::Transmit;
        }
    }

    fn enable_receive(&mut self, hal: &mut impl BusHal) {
        if self.current != BusDirection::Receive {
            hal.set_direction(BusDirection::Receive);
            self.current = BusDirection::Receive;
        }
    }

    const fn current(&self) -> BusDirection {
        self.current
    }
}

/// Bus node (listener/responder) side of the protocol.
///
/// Every method is an interrupt-context entry point: none of them block,
/// and each performs a bounded amount of work regardless of frame or
/// response size. Decoded requests addressed to this node are moved into
/// the single-producer/single-consumer queue whose [`Producer`] end the
/// node owns; the application consumes them in task context, builds a
/// reply, and hands it back through [`begin_transmit`](Self::begin_transmit).
///
/// `N` is the queue storage size; a queue of size `N` holds `N - 1`
/// requests.
///
/// # Example
///
/// ```
/// use heapless::spsc::Queue;
/// use panelbus_proto::{addr, BusDirection, BusHal, Config, MessageType, Node, Response};
///
/// struct NullHal;
///
/// impl BusHal for NullHal {
///     fn load_tx(&mut self, _byte: u8) -> bool {
///         true
///     }
///     fn tx_idle(&self) -> bool {
///         true
///     }
///     fn read_rx(&mut self) -> Option<u8> {
///         None
///     }
///     fn set_direction(&mut self, _direction: BusDirection) {}
/// }
///
/// let mut queue: Queue<_, 8> = Queue::new();
/// let (producer, mut consumer) = queue.split();
/// let mut node = Node::new(Config::new(addr(5)).unwrap(), NullHal, producer);
///
/// // Interrupt context: one call per byte on the wire.
/// for byte in [0x05, 0x02, 0x00] {
///     node.on_byte_received(byte);
/// }
///
/// // Task context: take the decoded request and reply.
/// let request = consumer.dequeue().expect("poll decoded");
/// assert_eq!(request.message_type(), MessageType::Poll);
/// node.begin_transmit(&Response::Empty).unwrap();
/// node.on_transmit_complete();
/// assert!(!node.is_transmitting());
/// ```
pub struct Node<'q, H: BusHal, const N: usize> {
    config: Config,
    hal: H,
    decoder: Decoder,
    requests: Producer<'q, Frame, N>,
    tx: Option<TxJob>,
    direction: DirectionControl,
    stall_ticks: u16,
    stats: Stats,
}

impl<'q, H: BusHal, const N: usize> Node<'q, H, N> {
    /// Create a new node. The transceiver is put in receive direction.
    pub fn new(config: Config, mut hal: H, requests: Producer<'q, Frame, N>) -> Self {
        let direction = DirectionControl::new(&mut hal);
        Self {
            decoder: Decoder::new(config.checksum),
            config,
            hal,
            requests,
            tx: None,
            direction,
            stall_ticks: 0,
            stats: Stats::default(),
        }
    }

    /// Consume one byte delivered by the receive interrupt.
    ///
    /// While a transmission is in flight the byte is transceiver echo and
    /// is discarded; the completion path drains whatever echo remains.
    pub fn on_byte_received(&mut self, byte: u8) {
        if self.tx.is_some() {
            return;
        }
        self.stall_ticks = 0;
        match self.decoder.feed(byte) {
            Step::NeedData => {}
            Step::Complete(frame) => self.accept(frame),
            Step::Rejected(FrameError::ChecksumMismatch) => {
                bump(&mut self.stats.checksum_errors);
                debug!("checksum mismatch, frame dropped");
            }
            Step::Rejected(FrameError::LengthOutOfRange) => {
                bump(&mut self.stats.malformed_length);
                debug!("length byte out of range, frame dropped");
            }
            Step::Rejected(FrameError::AddressOutOfRange) => {
                bump(&mut self.stats.sync_errors);
                trace!("skipped non-address byte {:#04x}", byte);
            }
        }
    }

    /// Drain the hardware receive buffer through
    /// [`on_byte_received`](Self::on_byte_received).
    pub fn service_receive(&mut self) {
        while let Some(byte) = self.hal.read_rx() {
            self.on_byte_received(byte);
        }
    }

    fn accept(&mut self, frame: Frame) {
        if !(frame.is_broadcast() || frame.address() == self.config.address) {
            // Parsed in full to stay synchronized, but not ours.
            bump(&mut self.stats.frames_ignored);
            return;
        }
        if !self.config.enabled {
            bump(&mut self.stats.frames_ignored);
            return;
        }
        bump(&mut self.stats.frames_received);
        if self.requests.enqueue(frame).is_err() {
            bump(&mut self.stats.requests_dropped);
            warn!("request queue full, frame dropped");
        }
    }

    /// Start sending a reply.
    ///
    /// Serializes the response, claims the bus, loads as many bytes as
    /// the hardware transmit buffer accepts and returns; the rest follow
    /// on buffer-space notifications. Never blocks.
    ///
    /// A node must not reply to a broadcast; that rule is the
    /// application's to honor, see [`Frame::is_broadcast`].
    ///
    /// # Errors
    /// [`Error::TransmitterBusy`] if a transmission is already in flight
    /// (a bug in the surrounding firmware; the in-flight job is left
    /// untouched), [`Error::Disabled`] if the node is disabled.
    pub fn begin_transmit(&mut self, response: &Response) -> Result<(), Error> {
        ensure!(self.config.enabled, DisabledSnafu);
        if self.tx.is_some() || self.direction.current() == BusDirection::Transmit {
            bump(&mut self.stats.tx_faults);
            warn!("begin_transmit while a transmission is in flight");
            return TransmitterBusySnafu.fail();
        }
        let mut job = TxJob {
            data: response.encode(self.config.checksum),
            loaded: 0,
            echo_pending: self.config.local_echo,
        };
        self.direction.enable_transmit(&mut self.hal);
        Self::pump(&mut job, &mut self.hal);
        self.tx = Some(job);
        Ok(())
    }

    /// Feed the hardware transmit buffer after a buffer-space
    /// notification, and finish the job once the transmitter has fully
    /// drained.
    pub fn on_transmit_space(&mut self) {
        let fully_loaded = match self.tx.as_mut() {
            None => return,
            Some(job) => {
                Self::pump(job, &mut self.hal);
                job.fully_loaded()
            }
        };
        if fully_loaded && self.hal.tx_idle() {
            self.finish_transmit();
        }
    }

    /// Handle the hardware transmission-complete notification.
    pub fn on_transmit_complete(&mut self) {
        self.on_transmit_space();
    }

    /// Safety-net tick, called from a periodic timer interrupt.
    ///
    /// A frame that stalls mid-reception for more than the configured
    /// window is abandoned, so a dropped byte can never wedge the
    /// receiver.
    pub fn on_timer_tick(&mut self) {
        if self.tx.is_some() || !self.decoder.in_frame() {
            self.stall_ticks = 0;
            return;
        }
        self.stall_ticks = self.stall_ticks.saturating_add(1);
        if self.stall_ticks > self.config.safety_net_window {
            self.decoder.reset();
            self.stall_ticks = 0;
            bump(&mut self.stats.safety_net_recoveries);
            debug!("receive stalled mid-frame, decoder reset");
        }
    }

    fn pump(job: &mut TxJob, hal: &mut H) {
        while job.loaded < job.data.len() && hal.load_tx(job.data[job.loaded]) {
            job.loaded += 1;
        }
    }

    /// Hand the bus back to the receiver. The job must be cleared and the
    /// echo drained before the direction flips and reception re-arms;
    /// reordering these steps lets echo bytes masquerade as a new frame.
    fn finish_transmit(&mut self) {
        let job = self.tx.take();
        if let Some(job) = job {
            if job.echo_pending {
                // At most one echo byte per transmitted byte can be
                // pending; anything beyond that is genuine traffic.
                for _ in 0..job.data.len() {
                    if self.hal.read_rx().is_none() {
                        break;
                    }
                }
            }
        }
        fence(Ordering::SeqCst);
        self.decoder.reset();
        self.stall_ticks = 0;
        self.direction.enable_receive(&mut self.hal);
    }

    /// The configured node address.
    pub const fn address(&self) -> Address {
        self.config.address()
    }

    /// Returns true while a transmission is in flight.
    pub const fn is_transmitting(&self) -> bool {
        self.tx.is_some()
    }

    /// The direction the transceiver is currently driven in.
    pub const fn direction(&self) -> BusDirection {
        self.direction.current()
    }

    /// Snapshot of the diagnostic counters.
    pub const fn stats(&self) -> Stats {
        self.stats
    }

    /// Access the underlying hardware interface.
    pub fn hal_mut(&mut self) -> &mut H {
        &mut self.hal
    }
}
