use std::error::Error;
use std::io::{self, Read, Write};

use heapless::spsc::Queue;
use panelbus_proto::{addr, BusDirection, BusHal, Config, MessageType, Node, Payload, Response};

/// Demo node on stdin/stdout: broadcast data is remembered, polls are
/// answered with the most recent payload.
struct StdioHal {
    stdout: io::Stdout,
}

impl BusHal for StdioHal {
    fn load_tx(&mut self, byte: u8) -> bool {
        self.stdout.write_all(&[byte]).is_ok()
    }

    fn tx_idle(&self) -> bool {
        true
    }

    fn read_rx(&mut self) -> Option<u8> {
        None
    }

    fn set_direction(&mut self, _direction: BusDirection) {}
}

fn node_main_loop() -> Result<(), Box<dyn Error>> {
    let mut queue: Queue<_, 8> = Queue::new();
    let (producer, mut consumer) = queue.split();

    // stdio has no transceiver echo
    let config = Config::new(addr(10))?.local_echo(false);
    let stdout = io::stdout();
    let mut node = Node::new(config, StdioHal { stdout }, producer);

    let mut latest = Payload::new();

    let mut stdin = io::stdin();
    loop {
        let mut buf = [0u8; 1];
        if stdin.read(&mut buf)? == 0 {
            break;
        }
        node.on_byte_received(buf[0]);

        while let Some(request) = consumer.dequeue() {
            match request.message_type() {
                MessageType::Data => {
                    latest.clear();
                    latest
                        .try_extend_from_slice(request.payload())
                        .expect("payload fits");
                }
                MessageType::Poll if !request.is_broadcast() => {
                    let reply = Response::data(MessageType::Data, &latest)?;
                    node.begin_transmit(&reply)?;
                    node.on_transmit_complete();
                    node.hal_mut().stdout.flush()?;
                }
                _ => {}
            }
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    node_main_loop()
}
