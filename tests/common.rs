//! In-process SMSC fake for end-to-end tests.
//!
//! Speaks the crate's own codec over real TCP: answers binds, acknowledges
//! submits with a configurable status, optionally emits DELIVRD receipts,
//! and can be told to go silent on enquire_link or to drop the connection
//! on the next submit.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use smpp_esme::codec::Frame;
use smpp_esme::connection::{FrameReader, FrameWriter};
use smpp_esme::datatypes::{
    message_state, BindTransceiverResponse, CommandStatus, DeliverSm, EnquireLinkResponse,
    QuerySmResponse, SubmitSm, SubmitSmResponse, UnbindResponse, ESM_CLASS_DELIVERY_RECEIPT,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex as AsyncMutex;

static INIT_TRACING: Once = Once::new();

pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_target(false)
            .without_time()
            .try_init();
    });
}

/// Shared, test-adjustable behavior of the fake.
pub struct SmscState {
    /// Status returned in every submit_sm_resp.
    pub submit_status: Mutex<CommandStatus>,
    /// Emit a DELIVRD receipt shortly after each accepted submit.
    pub auto_receipt: AtomicBool,
    /// Answer enquire_link probes.
    pub answer_enquire: AtomicBool,
    /// Drop the connection (no response) on the next submit_sm.
    pub drop_next_submit: AtomicBool,

    /// Every submit_sm observed, across connections.
    pub submits: Mutex<Vec<SubmitSm>>,
    /// Successful binds accepted.
    pub binds: AtomicUsize,
    /// Unbinds acknowledged.
    pub unbinds: AtomicUsize,
    /// Set when a connection sees a duplicate in-flight sequence number.
    pub seq_collision: AtomicBool,

    next_msg_id: AtomicU32,
}

impl Default for SmscState {
    fn default() -> Self {
        Self {
            submit_status: Mutex::new(CommandStatus::Ok),
            auto_receipt: AtomicBool::new(true),
            answer_enquire: AtomicBool::new(true),
            drop_next_submit: AtomicBool::new(false),
            submits: Mutex::new(Vec::new()),
            binds: AtomicUsize::new(0),
            unbinds: AtomicUsize::new(0),
            seq_collision: AtomicBool::new(false),
            next_msg_id: AtomicU32::new(0),
        }
    }
}

impl SmscState {
    pub fn submit_count(&self) -> usize {
        self.submits.lock().unwrap().len()
    }

    pub fn observed_submits(&self) -> Vec<SubmitSm> {
        self.submits.lock().unwrap().clone()
    }
}

pub struct FakeSmsc {
    pub addr: SocketAddr,
    pub state: Arc<SmscState>,
}

impl FakeSmsc {
    /// Bind a listener on an ephemeral port and serve connections until the
    /// test drops the runtime.
    pub async fn start() -> FakeSmsc {
        let state = Arc::new(SmscState::default());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept_state = Arc::clone(&state);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(serve_connection(Arc::clone(&accept_state), stream));
            }
        });

        FakeSmsc { addr, state }
    }

    pub fn url(&self) -> String {
        self.addr.to_string()
    }
}

async fn serve_connection(state: Arc<SmscState>, stream: TcpStream) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half);
    let writer = Arc::new(AsyncMutex::new(FrameWriter::new(write_half)));
    let mut seen_seqs = std::collections::HashSet::new();
    // server-originated PDUs (receipts) need their own sequence space
    let server_seq = Arc::new(AtomicU32::new(1000));

    loop {
        let frame = match reader.read_frame().await {
            Ok(Some(frame)) => frame,
            _ => return,
        };

        if !frame.is_response() && !seen_seqs.insert(frame.sequence_number()) {
            state.seq_collision.store(true, Ordering::SeqCst);
        }

        match frame {
            Frame::BindTransceiver(pdu) => {
                state.binds.fetch_add(1, Ordering::SeqCst);
                let resp = BindTransceiverResponse::new(pdu.sequence_number, "fake-smsc");
                if write(&writer, Frame::BindTransceiverResp(resp)).await.is_err() {
                    return;
                }
            }
            Frame::EnquireLink(pdu) => {
                if state.answer_enquire.load(Ordering::SeqCst) {
                    let resp = EnquireLinkResponse::new(pdu.sequence_number);
                    if write(&writer, Frame::EnquireLinkResp(resp)).await.is_err() {
                        return;
                    }
                }
            }
            Frame::SubmitSm(pdu) => {
                if state.drop_next_submit.swap(false, Ordering::SeqCst) {
                    // simulate a transport fault: close without responding
                    return;
                }

                state.submits.lock().unwrap().push(*pdu.clone());
                let status = *state.submit_status.lock().unwrap();

                if status == CommandStatus::Ok {
                    let msg_id = format!(
                        "MSG{:06}",
                        state.next_msg_id.fetch_add(1, Ordering::SeqCst) + 1
                    );
                    let resp = SubmitSmResponse::new(pdu.sequence_number, &msg_id);
                    if write(&writer, Frame::SubmitSmResp(resp)).await.is_err() {
                        return;
                    }

                    if state.auto_receipt.load(Ordering::SeqCst) {
                        let writer = Arc::clone(&writer);
                        let server_seq = Arc::clone(&server_seq);
                        let source = pdu.destination_addr.clone();
                        let dest = pdu.source_addr.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            let receipt = delivery_receipt(
                                server_seq.fetch_add(1, Ordering::SeqCst),
                                &msg_id,
                                &source,
                                &dest,
                            );
                            let _ = write(&writer, Frame::DeliverSm(Box::new(receipt))).await;
                        });
                    }
                } else {
                    let resp = SubmitSmResponse::error(pdu.sequence_number, status);
                    if write(&writer, Frame::SubmitSmResp(resp)).await.is_err() {
                        return;
                    }
                }
            }
            Frame::QuerySm(pdu) => {
                let resp = QuerySmResponse::new(
                    pdu.sequence_number,
                    &pdu.message_id,
                    message_state::DELIVERED,
                );
                if write(&writer, Frame::QuerySmResp(resp)).await.is_err() {
                    return;
                }
            }
            Frame::Unbind(pdu) => {
                state.unbinds.fetch_add(1, Ordering::SeqCst);
                let resp = UnbindResponse::new(pdu.sequence_number);
                let _ = write(&writer, Frame::UnbindResp(resp)).await;
            }
            Frame::DeliverSmResp(_) | Frame::GenericNack(_) => {}
            other => {
                tracing::debug!("fake smsc ignoring {:?}", other.command_id());
            }
        }
    }
}

async fn write(writer: &Arc<AsyncMutex<FrameWriter>>, frame: Frame) -> std::io::Result<()> {
    writer.lock().await.write_frame(&frame).await
}

fn delivery_receipt(seq: u32, msg_id: &str, source: &str, dest: &str) -> DeliverSm {
    DeliverSm {
        sequence_number: seq,
        source_addr: source.to_string(),
        destination_addr: dest.to_string(),
        esm_class: ESM_CLASS_DELIVERY_RECEIPT,
        short_message: bytes::Bytes::from(format!(
            "id:{msg_id} sub:001 dlvrd:001 submit date:2402141200 done date:2402141201 \
             stat:DELIVRD err:000 text:ok"
        )),
        ..DeliverSm::default()
    }
}
