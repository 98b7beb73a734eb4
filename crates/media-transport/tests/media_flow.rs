//! Cross-module scenarios: handshake flight batching over the shared
//! connector, receive-queue eviction, and the depacketizer driving keyframe
//! recovery end to end.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use media_transport::buffer::PacketPool;
use media_transport::dtls::record::{DATAGRAM_LIMIT, DTLS_RECORD_HEADER_LEN};
use media_transport::dtls::{DatagramConnector, DtlsDatagramTransport, ReceiveTimeout};
use media_transport::packet::rtcp::{RtcpFeedback, FMT_PLI};
use media_transport::payload::{
    is_keyframe, H264Depacketizer, KeyframeRequester, KeyframeScheduler, RtcpKeyframeRequester,
    NAL_START_CODE,
};
use media_transport::Result;

struct CollectorConnector {
    datagrams: Mutex<Vec<Vec<u8>>>,
}

impl CollectorConnector {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            datagrams: Mutex::new(Vec::new()),
        })
    }

    fn sent(&self) -> Vec<Vec<u8>> {
        self.datagrams.lock().clone()
    }
}

impl DatagramConnector for CollectorConnector {
    fn send_datagram(&self, payload: &[u8]) -> Result<()> {
        self.datagrams.lock().push(payload.to_vec());
        Ok(())
    }
}

fn handshake_record(msg_type: u8, body: &[u8]) -> Vec<u8> {
    let mut record = vec![0u8; DTLS_RECORD_HEADER_LEN];
    record[0] = 22;
    record.push(msg_type);
    record.extend_from_slice(body);
    record
}

#[test]
fn handshake_flight_crosses_as_one_datagram() {
    let connector = CollectorConnector::new();
    let pool = Arc::new(PacketPool::new(DATAGRAM_LIMIT));
    let transport = DtlsDatagramTransport::new(connector.clone(), pool);

    let fragment_a = handshake_record(11, b"certificate-fragment-a");
    let fragment_b = handshake_record(16, b"client-key-exchange-fragment-b");
    let finished = handshake_record(20, b"finished");

    transport.send(&fragment_a).unwrap();
    transport.send(&fragment_b).unwrap();
    assert!(connector.sent().is_empty(), "flight flushed early");

    transport.send(&finished).unwrap();

    let sent = connector.sent();
    assert_eq!(sent.len(), 1);
    let mut expected = fragment_a;
    expected.extend_from_slice(&fragment_b);
    expected.extend_from_slice(&finished);
    assert_eq!(sent[0], expected);
}

#[test]
fn receive_queue_eviction_keeps_newest() {
    let connector = CollectorConnector::new();
    let pool = Arc::new(PacketPool::new(256));
    let capacity = 3;
    let transport = DtlsDatagramTransport::with_queue_capacity(connector, pool.clone(), capacity);

    for i in 0..=capacity {
        transport.queue_receive(&[i as u8; 4]);
    }

    assert_eq!(transport.queued(), capacity);
    assert_eq!(pool.pooled(), 1);

    // The oldest datagram is gone; the rest drain in arrival order.
    let mut buf = [0u8; 8];
    for i in 1..=capacity {
        let n = transport
            .receive(&mut buf, ReceiveTimeout::NonBlocking)
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], &[i as u8; 4]);
    }
    assert_eq!(
        transport
            .receive(&mut buf, ReceiveTimeout::NonBlocking)
            .unwrap(),
        None
    );
}

#[test]
fn receive_honours_bounded_timeout() {
    let connector = CollectorConnector::new();
    let pool = Arc::new(PacketPool::new(256));
    let transport = DtlsDatagramTransport::new(connector, pool);

    let mut buf = [0u8; 8];
    let outcome = transport
        .receive(&mut buf, ReceiveTimeout::Bounded(Duration::from_millis(20)))
        .unwrap();
    assert_eq!(outcome, None, "timeout must signal 'retransmit', not data");
}

#[tokio::test]
async fn damaged_stream_recovers_on_idr() {
    let connector = CollectorConnector::new();
    let requester = Arc::new(RtcpKeyframeRequester::new(0xaaaa, 0xbbbb, connector.clone()));
    let scheduler = KeyframeScheduler::new(vec![requester as Arc<dyn KeyframeRequester>]);

    let mut depacketizer = H264Depacketizer::new();
    depacketizer.set_keyframe_scheduler(scheduler.clone());

    // A mid-fragment loss leaves the stream wanting a keyframe.
    let fu_start = [0x7c, 0x80 | 1, 0x10, 0x20];
    assert!(depacketizer.depacketize(100, &fu_start).is_none());
    let fu_cont = [0x7c, 1, 0x30];
    assert!(depacketizer.depacketize(102, &fu_cont).is_none());
    assert!(scheduler.is_keyframe_wanted());

    // The peer answers with SPS, PPS, IDR as single NAL units.
    let sps = [0x67, 0x64, 0x00, 0x1f];
    let pps = [0x68, 0xee, 0x3c, 0x80];
    let idr = [0x65, 0x88, 0x84, 0x00];

    let mut units = Vec::new();
    for (seq, payload) in [(103u16, &sps[..]), (104, &pps[..]), (105, &idr[..])] {
        let out = depacketizer
            .depacketize(seq, payload)
            .expect("single nal unit completes immediately");
        units.push(out.to_vec());
    }

    assert_eq!(units.len(), 3);
    for (unit, payload) in units.iter().zip([&sps[..], &pps[..], &idr[..]]) {
        let mut expected = NAL_START_CODE.to_vec();
        expected.extend_from_slice(payload);
        assert_eq!(unit, &expected);
    }

    assert!(!is_keyframe(&fu_start));
    assert!(is_keyframe(&sps));
    assert!(is_keyframe(&idr));

    // The IDR cleared the pending request.
    assert!(!scheduler.is_keyframe_wanted());
    scheduler.stop();
}

#[tokio::test]
async fn keyframe_request_reaches_the_wire_as_pli() {
    let connector = CollectorConnector::new();
    let requester = Arc::new(RtcpKeyframeRequester::new(0x1234, 0x5678, connector.clone()));
    let scheduler = KeyframeScheduler::new(vec![requester as Arc<dyn KeyframeRequester>]);

    let mut depacketizer = H264Depacketizer::new();
    depacketizer.set_keyframe_scheduler(scheduler.clone());

    // Sequence gap flags the need; the scheduler's grace period from
    // construction must elapse before the request is allowed out.
    assert!(depacketizer.depacketize(1, &[0x41, 0x00]).is_some());
    assert!(depacketizer.depacketize(3, &[0x41, 0x00]).is_some());
    assert!(scheduler.is_keyframe_wanted());

    tokio::time::sleep(Duration::from_millis(1200)).await;

    let sent = connector.sent();
    assert!(!sent.is_empty(), "no keyframe request was sent");
    let feedback = RtcpFeedback::parse(&Bytes::from(sent[0].clone())).unwrap();
    assert_eq!(feedback.fmt, FMT_PLI);
    assert_eq!(feedback.sender_ssrc, 0x1234);
    assert_eq!(feedback.source_ssrc, 0x5678);
    scheduler.stop();
}
