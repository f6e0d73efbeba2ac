#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::Duration;

use panelbus_proto::wire::{parse_response, ResponseToken};
use panelbus_proto::{
    BusDirection, BusHal, ChecksumPolicy, Frame, IntoAddress, MessageType, Response,
};

/// In-memory hardware shim for single-threaded engine tests. Transmitted
/// bytes land in `tx` immediately; test code scripts `rx` by hand.
#[derive(Default)]
pub struct SimHal {
    pub rx: VecDeque<u8>,
    pub tx: Vec<u8>,
    pub direction_log: Vec<BusDirection>,
    pub echo: bool,
}

impl BusHal for SimHal {
    fn load_tx(&mut self, byte: u8) -> bool {
        self.tx.push(byte);
        if self.echo {
            self.rx.push_back(byte);
        }
        true
    }

    fn tx_idle(&self) -> bool {
        true
    }

    fn read_rx(&mut self) -> Option<u8> {
        self.rx.pop_front()
    }

    fn set_direction(&mut self, direction: BusDirection) {
        self.direction_log.push(direction);
    }
}

/// A simulated two-wire RS-485 bus. Every byte written by any tap is
/// delivered to every tap, the writer included — transceiver echo is part
/// of what the protocol engine has to cope with.
#[derive(Default)]
pub struct Rs485Bus {
    taps: Mutex<Vec<Weak<TapLink>>>,
}

struct TapLink {
    rx: Mutex<VecDeque<u8>>,
    rx_condvar: Condvar,
}

impl Rs485Bus {
    pub fn new() -> Arc<Rs485Bus> {
        Default::default()
    }

    pub fn new_tap(self: &Arc<Self>) -> BusTap {
        let link = Arc::new(TapLink {
            rx: Mutex::new(VecDeque::new()),
            rx_condvar: Condvar::new(),
        });
        self.taps.lock().unwrap().push(Arc::downgrade(&link));
        BusTap {
            bus: Arc::clone(self),
            link,
            timeout: Duration::from_secs(1),
        }
    }

    pub fn wake_blocked_taps(&self) {
        for weak in self.taps.lock().unwrap().iter() {
            if let Some(tap) = weak.upgrade() {
                tap.rx_condvar.notify_all();
            }
        }
    }

    fn broadcast(&self, byte: u8) {
        for weak in self.taps.lock().unwrap().iter() {
            if let Some(tap) = weak.upgrade() {
                tap.rx.lock().unwrap().push_back(byte);
                tap.rx_condvar.notify_all();
            }
        }
    }
}

pub struct BusTap {
    bus: Arc<Rs485Bus>,
    link: Arc<TapLink>,
    pub timeout: Duration,
}

impl BusTap {
    pub fn send(&self, data: &[u8]) {
        for byte in data {
            self.bus.broadcast(*byte);
        }
    }

    pub fn try_recv(&self) -> Option<u8> {
        self.link.rx.lock().unwrap().pop_front()
    }

    pub fn recv_timeout(&self) -> Option<u8> {
        let mut rx = self.link.rx.lock().unwrap();
        loop {
            if let Some(byte) = rx.pop_front() {
                return Some(byte);
            }
            let (guard, result) = self
                .link
                .rx_condvar
                .wait_timeout(rx, self.timeout)
                .expect("rx mutex poisoned");
            rx = guard;
            if result.timed_out() && rx.is_empty() {
                return None;
            }
        }
    }

    /// Block until a byte is waiting or `timeout` passes, without
    /// consuming anything.
    pub fn wait_for_data(&self, timeout: Duration) {
        let rx = self.link.rx.lock().unwrap();
        if rx.is_empty() {
            let _ = self
                .link
                .rx_condvar
                .wait_timeout(rx, timeout)
                .expect("rx mutex poisoned");
        }
    }
}

/// [`BusHal`] implementation over a bus tap, for running a node against
/// the simulated bus.
pub struct TapHal {
    tap: BusTap,
}

impl TapHal {
    pub fn new(tap: BusTap) -> Self {
        Self { tap }
    }

    pub fn wait_for_data(&self, timeout: Duration) {
        self.tap.wait_for_data(timeout);
    }
}

impl BusHal for TapHal {
    fn load_tx(&mut self, byte: u8) -> bool {
        self.tap.send(&[byte]);
        true
    }

    fn tx_idle(&self) -> bool {
        true
    }

    fn read_rx(&mut self) -> Option<u8> {
        self.tap.try_recv()
    }

    fn set_direction(&mut self, _direction: BusDirection) {}
}

/// Minimal master-side harness: encodes requests with the crate's frame
/// encoder and decodes replies with the buffer-level parser.
pub struct TestMaster {
    tap: BusTap,
    policy: ChecksumPolicy,
}

impl TestMaster {
    pub fn new(tap: BusTap) -> Self {
        Self {
            tap,
            policy: ChecksumPolicy::Xor,
        }
    }

    pub fn broadcast_data(&mut self, payload: &[u8]) {
        let frame = Frame::new(0u8, MessageType::Data, payload).unwrap();
        self.transmit(&frame.encode(self.policy));
    }

    pub fn send_data(&mut self, address: impl IntoAddress, payload: &[u8]) {
        let frame = Frame::new(address, MessageType::Data, payload).unwrap();
        self.transmit(&frame.encode(self.policy));
    }

    pub fn poll(&mut self, address: impl IntoAddress) -> Option<Response> {
        let frame = Frame::new(address, MessageType::Poll, &[]).unwrap();
        self.transmit(&frame.encode(self.policy));
        self.receive_response()
    }

    fn transmit(&mut self, bytes: &[u8]) {
        self.tap.send(bytes);
        // Drain our own echo before listening for a reply.
        for _ in bytes {
            let _ = self.tap.recv_timeout();
        }
    }

    fn receive_response(&mut self) -> Option<Response> {
        let mut buf = Vec::new();
        loop {
            buf.push(self.tap.recv_timeout()?);
            match parse_response(&buf, self.policy) {
                (_, ResponseToken::Complete(reply)) => return Some(reply),
                (_, ResponseToken::NeedData) => continue,
                (_, ResponseToken::Invalid) => return None,
            }
        }
    }
}
