mod common;

use common::SimHal;
use heapless::spsc::Queue;
use panelbus_proto::{addr, ChecksumPolicy, Config, Frame, MessageType, Node, Response};

#[test]
fn node_main_loop() {
    // Line noise, a broadcast carrying fresh panel state, a frame for
    // somebody else and a poll for us.
    let broadcast = Frame::new(0u8, MessageType::Data, &[0x11, 0x22]).unwrap();
    let foreign = Frame::new(9u8, MessageType::Data, &[0x77]).unwrap();
    let poll = Frame::new(10u8, MessageType::Poll, &[]).unwrap();

    let mut hal = SimHal::default();
    hal.rx.extend([0xf0, 0xff]);
    hal.rx.extend(broadcast.encode(ChecksumPolicy::Xor));
    hal.rx.extend(foreign.encode(ChecksumPolicy::Xor));
    hal.rx.extend(poll.encode(ChecksumPolicy::Xor));

    let mut queue: Queue<Frame, 8> = Queue::new();
    let (producer, mut consumer) = queue.split();
    let config = Config::new(addr(10)).unwrap().local_echo(false);
    let mut node = Node::new(config, hal, producer);

    let mut latest: Vec<u8> = Vec::new();
    node.service_receive();
    while let Some(request) = consumer.dequeue() {
        match request.message_type() {
            MessageType::Data => latest = request.payload().to_vec(),
            MessageType::Poll => {
                let reply = Response::data(MessageType::Data, &latest).unwrap();
                node.begin_transmit(&reply).unwrap();
                node.on_transmit_complete();
            }
            _ => {}
        }
    }

    let stats = node.stats();
    assert_eq!(stats.frames_received, 2);
    assert_eq!(stats.frames_ignored, 1);
    assert_eq!(stats.sync_errors, 2);
    assert_eq!(stats.checksum_errors, 0);

    let expected = Response::data(MessageType::Data, &[0x11, 0x22])
        .unwrap()
        .encode(ChecksumPolicy::Xor);
    assert_eq!(node.hal_mut().tx, expected.as_slice());
}

#[test]
fn node_survives_garbage() {
    let mut hal = SimHal::default();
    // Random junk must never wedge or panic the engine.
    hal.rx
        .extend((0..=255u8).chain((0..=255u8).rev()).chain(0..=255u8));

    let mut queue: Queue<Frame, 8> = Queue::new();
    let (producer, mut consumer) = queue.split();
    let config = Config::new(addr(99)).unwrap().local_echo(false);
    let mut node = Node::new(config, hal, producer);

    node.service_receive();
    while consumer.dequeue().is_some() {}

    // Still alive and in sync for a real poll.
    let poll = Frame::new(99u8, MessageType::Poll, &[]).unwrap();
    node.on_timer_tick();
    node.on_timer_tick();
    node.on_timer_tick();
    node.hal_mut().rx.extend(poll.encode(ChecksumPolicy::Xor));
    node.service_receive();
    assert!(consumer.dequeue().is_some());
}
