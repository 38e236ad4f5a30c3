//! End-to-end scenarios against the in-process SMSC fake: bind, submit,
//! segmentation, delivery-receipt aggregation, protocol NAKs, transport
//! faults with retry replay, liveness-driven rebind and rate limiting.

mod common;

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{init_tracing, FakeSmsc};
use smpp_esme::datatypes::{CommandStatus, ESM_CLASS_UDHI};
use smpp_esme::session::{ConnStatus, Session, SessionConfig};
use smpp_esme::{
    Auth, DeliverySetting, Manager, Message, MessageStatus, OutboundMessage, Part, PartStatus,
    Settings,
};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};

type Report = (Arc<Message>, Vec<Arc<Part>>);

fn base_settings(smsc: &FakeSmsc) -> Settings {
    Settings {
        url: smsc.url(),
        auth: Auth {
            system_id: "tester".into(),
            password: "secret".into(),
            ..Auth::default()
        },
        enquiry_interval: Duration::from_millis(100),
        enquiry_timeout: Duration::from_millis(100),
        bind_interval: Duration::from_millis(150),
        register: DeliverySetting::Final,
        ..Settings::default()
    }
}

fn with_reports(mut settings: Settings) -> (Settings, mpsc::UnboundedReceiver<Report>) {
    let (tx, rx) = mpsc::unbounded_channel();
    settings.on_message_report = Some(Arc::new(move |_, message, parts| {
        let _ = tx.send((message, parts));
    }));
    (settings, rx)
}

/// Receive reports until one matches, bounded by `wait`.
async fn recv_report_matching(
    rx: &mut mpsc::UnboundedReceiver<Report>,
    wait: Duration,
    predicate: impl Fn(&Report) -> bool,
) -> Report {
    timeout(wait, async {
        loop {
            let report = rx.recv().await.expect("report channel closed");
            if predicate(&report) {
                return report;
            }
        }
    })
    .await
    .expect("timed out waiting for a matching report")
}

#[tokio::test]
async fn happy_path_single_message_is_delivered() {
    init_tracing();
    let smsc = FakeSmsc::start().await;
    let (settings, mut reports) = with_reports(base_settings(&smsc));
    let manager = Manager::new(settings).unwrap();

    let message = manager
        .send(OutboundMessage::new("Acme", "+15551234", "hi"))
        .await
        .unwrap();

    assert_eq!(message.total_parts(), 1);
    assert!(message.sent_at().is_some());

    // submission report first, terminal report second
    let first = timeout(Duration::from_secs(2), reports.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.1.len(), 1);

    let (delivered, parts) = recv_report_matching(&mut reports, Duration::from_secs(2), |(m, _)| {
        m.status() == MessageStatus::Delivered
    })
    .await;

    assert_eq!(delivered.id, message.id);
    assert_eq!(delivered.delivered_parts(), 1);
    assert_eq!(delivered.failed_parts(), 0);
    assert!(delivered.delivered_at().is_some());
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].status(), PartStatus::Delivered);
    assert!(parts[0].network_id.starts_with("MSG"));

    // terminal messages are evicted from the live indices
    assert!(manager.get_messages().is_empty());
    assert!(manager.last_message_at().is_some());
    assert!(manager.last_delivered_message_at().is_some());
}

#[tokio::test]
async fn long_ucs2_message_is_segmented_and_fully_delivered() {
    init_tracing();
    let smsc = FakeSmsc::start().await;
    let (settings, mut reports) = with_reports(base_settings(&smsc));
    let manager = Manager::new(settings).unwrap();

    let text = "अ".repeat(200); // 400 UCS-2 octets => 3 segments
    let message = manager
        .send(OutboundMessage::new("Acme", "+15551234", &text))
        .await
        .unwrap();
    assert_eq!(message.total_parts(), 3);

    let submits = smsc.state.observed_submits();
    assert_eq!(submits.len(), 3);

    let mut refs = HashSet::new();
    for (index, submit) in submits.iter().enumerate() {
        assert_eq!(submit.data_coding, 0x08);
        assert_ne!(submit.esm_class & ESM_CLASS_UDHI, 0, "UDHI bit missing");

        let udh = &submit.short_message[..6];
        assert_eq!(&udh[..3], &[0x05, 0x00, 0x03]);
        refs.insert(udh[3]);
        assert_eq!(udh[4], 3, "SEG_TOTAL");
        assert_eq!(udh[5], index as u8 + 1, "SEG_INDEX");
    }
    assert_eq!(refs.len(), 1, "segments must share one reference");

    let (delivered, parts) = recv_report_matching(&mut reports, Duration::from_secs(3), |(m, _)| {
        m.status() == MessageStatus::Delivered
    })
    .await;

    assert_eq!(delivered.delivered_parts(), 3);
    assert_eq!(parts.len(), 3);
    assert!(parts.iter().all(|p| p.status() == PartStatus::Delivered));
}

#[tokio::test]
async fn protocol_nak_fails_the_part_and_the_message() {
    init_tracing();
    let smsc = FakeSmsc::start().await;
    *smsc.state.submit_status.lock().unwrap() = CommandStatus::InvalidDestinationAddress;
    smsc.state.auto_receipt.store(false, Ordering::SeqCst);

    let (settings, mut reports) = with_reports(base_settings(&smsc));
    let manager = Manager::new(settings).unwrap();

    // a NAK is a per-part outcome, not a send error
    let message = manager
        .send(OutboundMessage::new("Acme", "not-a-number", "hi"))
        .await
        .unwrap();

    assert_eq!(message.status(), MessageStatus::Failed);
    assert_eq!(message.failed_parts(), 1);
    assert_eq!(message.delivered_parts(), 0);

    let (failed, parts) = recv_report_matching(&mut reports, Duration::from_secs(2), |(m, _)| {
        m.status() == MessageStatus::Failed
    })
    .await;

    assert_eq!(failed.id, message.id);
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].status(), PartStatus::Failed);
    let error = parts[0].error().expect("part error recorded");
    assert!(
        error.contains("invalid destination address"),
        "unexpected error: {error}"
    );

    // the session survives a NAK: a follow-up send succeeds
    *smsc.state.submit_status.lock().unwrap() = CommandStatus::Ok;
    let retry = manager
        .send(OutboundMessage::new("Acme", "+15551234", "hi again"))
        .await
        .unwrap();
    assert_eq!(retry.sent_parts(), 1);
}

#[tokio::test]
async fn transport_drop_buffers_and_replays_on_reconnect() {
    init_tracing();
    let smsc = FakeSmsc::start().await;
    smsc.state.drop_next_submit.store(true, Ordering::SeqCst);

    let (settings, mut reports) = with_reports(base_settings(&smsc));
    let manager = Manager::new(settings).unwrap();

    let result = manager
        .send(OutboundMessage {
            id: Some("retry-1".into()),
            from: "Acme".into(),
            to: "+15551234".into(),
            text: "persistent".into(),
            user: None,
        })
        .await;
    assert!(result.is_err(), "dropped submission must surface an error");

    // the failed-send report observes the buffered message
    let (failed, _) = recv_report_matching(&mut reports, Duration::from_secs(2), |(m, _)| {
        m.id == "retry-1" && m.status() == MessageStatus::Failed
    })
    .await;
    assert!(failed.error().unwrap().contains("unable to send"));

    // the session rebinds within bind_interval and the retry buffer drains
    let (delivered, _) = recv_report_matching(&mut reports, Duration::from_secs(5), |(m, _)| {
        m.id == "retry-1" && m.status() == MessageStatus::Delivered
    })
    .await;
    assert_eq!(delivered.delivered_parts(), 1);

    // exactly one submit reached the SMSC (the dropped one never counted)
    assert_eq!(smsc.state.submit_count(), 1);
}

#[tokio::test]
async fn missed_enquire_links_trigger_rebind() {
    init_tracing();
    let smsc = FakeSmsc::start().await;
    smsc.state.answer_enquire.store(false, Ordering::SeqCst);

    let manager = Manager::new(base_settings(&smsc)).unwrap();
    manager.start().await.unwrap();
    assert_eq!(smsc.state.binds.load(Ordering::SeqCst), 1);

    // probes at 100ms, two misses per cycle, rebind after 150ms: three
    // binds arrive comfortably within five seconds
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if smsc.state.binds.load(Ordering::SeqCst) >= 3 {
            break;
        }
        assert!(Instant::now() < deadline, "session never rebound");
        sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn concurrent_sends_are_rate_limited_without_collisions() {
    init_tracing();
    let smsc = FakeSmsc::start().await;
    smsc.state.auto_receipt.store(false, Ordering::SeqCst);

    let mut settings = base_settings(&smsc);
    settings.max_connection = 2;
    settings.use_all_connection = true;
    settings.throttle = 500;
    settings.register = DeliverySetting::None;
    let manager = Manager::new(settings).unwrap();

    manager.start().await.unwrap();
    assert_eq!(manager.session_ids().len(), 2);
    assert_eq!(smsc.state.binds.load(Ordering::SeqCst), 2);

    let started = Instant::now();
    let mut handles = Vec::new();
    for i in 0..300 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            manager
                .send(OutboundMessage::new("Acme", "+15550000", &format!("msg {i}")))
                .await
        }));
    }
    for handle in handles {
        let message = handle.await.unwrap().unwrap();
        assert_eq!(message.status(), MessageStatus::Sent);
    }

    // 150 submissions per session at 500/s cannot finish faster than ~300ms
    assert!(
        started.elapsed() >= Duration::from_millis(200),
        "rate limiter did not pace submissions"
    );
    assert_eq!(smsc.state.submit_count(), 300);
    assert!(
        !smsc.state.seq_collision.load(Ordering::SeqCst),
        "duplicate in-flight sequence numbers observed"
    );
    assert_eq!(manager.get_messages().len(), 300);
}

#[tokio::test]
async fn graceful_close_sends_unbind() {
    init_tracing();
    let smsc = FakeSmsc::start().await;
    let manager = Manager::new(base_settings(&smsc)).unwrap();

    manager.start().await.unwrap();
    manager.close(None).await.unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    while smsc.state.unbinds.load(Ordering::SeqCst) == 0 {
        assert!(Instant::now() < deadline, "unbind never reached the SMSC");
        sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn session_query_reports_message_state() {
    init_tracing();
    let smsc = FakeSmsc::start().await;
    smsc.state.auto_receipt.store(false, Ordering::SeqCst);

    let config = SessionConfig {
        addr: smsc.url(),
        system_id: "tester".into(),
        password: "secret".into(),
        auto_rebind: false,
        ..SessionConfig::default()
    };
    let (session, mut events) = Session::bind(config, Arc::new(|_| {}));

    timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await {
                Some(ConnStatus::Connected) => break,
                Some(_) => continue,
                None => panic!("session events closed before bind"),
            }
        }
    })
    .await
    .unwrap();

    let submit = smpp_esme::datatypes::SubmitSm {
        source_addr: "Acme".into(),
        destination_addr: "15551234".into(),
        short_message: bytes::Bytes::from_static(b"queryable"),
        ..smpp_esme::datatypes::SubmitSm::default()
    };
    let resp = session.submit(submit).await.unwrap();
    assert!(resp.command_status.is_ok());

    let query = session.query(&resp.message_id, "Acme").await.unwrap();
    assert_eq!(query.message_id, resp.message_id);
    assert_eq!(
        query.message_state,
        smpp_esme::datatypes::message_state::DELIVERED
    );

    session.close().await;
}
