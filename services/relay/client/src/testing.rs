//! In-memory transport and a scripted relay server for tests.

use crate::transport::{Dialer, RelayTransport};
use async_trait::async_trait;
use bytes::Bytes;
use relay_wire::{
    determine_client_msg_type, hash_id, hash_id_to_string, marshal_hello_response,
    marshal_transport_msg, unmarshal_hello_msg, unmarshal_transport_id,
    unmarshal_transport_payload, MsgType, PeerId,
};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One end of an in-memory datagram pipe
pub(crate) struct MemoryTransport {
    incoming: tokio::sync::Mutex<mpsc::UnboundedReceiver<Bytes>>,
    outgoing: mpsc::UnboundedSender<Bytes>,
    closed: AtomicBool,
    link: CancellationToken,
    fail_close: bool,
}

/// Two connected in-memory transports
pub(crate) fn memory_pair() -> (Arc<MemoryTransport>, Arc<MemoryTransport>) {
    memory_pair_with(false)
}

/// Like [`memory_pair`], but closing the first end reports an error
fn memory_pair_with(fail_close: bool) -> (Arc<MemoryTransport>, Arc<MemoryTransport>) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    let link = CancellationToken::new();

    let a = MemoryTransport {
        incoming: tokio::sync::Mutex::new(b_rx),
        outgoing: a_tx,
        closed: AtomicBool::new(false),
        link: link.clone(),
        fail_close,
    };
    let b = MemoryTransport {
        incoming: tokio::sync::Mutex::new(a_rx),
        outgoing: b_tx,
        closed: AtomicBool::new(false),
        link,
        fail_close: false,
    };
    (Arc::new(a), Arc::new(b))
}

impl MemoryTransport {
    /// Break the pipe; both ends fail their pending and future receives
    pub(crate) fn sever(&self) {
        self.link.cancel();
    }

    pub(crate) fn is_severed(&self) -> bool {
        self.link.is_cancelled()
    }
}

#[async_trait]
impl RelayTransport for MemoryTransport {
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut incoming = self.incoming.lock().await;
        tokio::select! {
            _ = self.link.cancelled() => {
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "link severed"))
            }
            msg = incoming.recv() => match msg {
                Some(msg) => {
                    let n = msg.len().min(buf.len());
                    buf[..n].copy_from_slice(&msg[..n]);
                    Ok(n)
                }
                None => Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer hung up")),
            },
        }
    }

    async fn send(&self, buf: &[u8]) -> io::Result<usize> {
        if self.link.is_cancelled() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "link severed"));
        }
        self.outgoing
            .send(Bytes::copy_from_slice(buf))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer hung up"))?;
        Ok(buf.len())
    }

    async fn close(&self) -> io::Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "already closed"));
        }
        self.link.cancel();
        if self.fail_close {
            return Err(io::Error::new(io::ErrorKind::Other, "close failed"));
        }
        Ok(())
    }
}

/// How the scripted relay answers a Hello
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HelloReply {
    /// Register the client and send a HelloResponse
    Accept,
    /// Answer with a Transport message instead
    WrongType,
    /// Never answer
    Silent,
}

struct MemoryDialer {
    accepted: mpsc::UnboundedSender<Arc<MemoryTransport>>,
    dials: AtomicUsize,
    refuse: AtomicBool,
    fail_close: AtomicBool,
}

#[async_trait]
impl Dialer for MemoryDialer {
    async fn dial(&self, _addr: &str) -> io::Result<Arc<dyn RelayTransport>> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "relay unreachable",
            ));
        }

        let (client, server) = memory_pair_with(self.fail_close.load(Ordering::SeqCst));
        self.accepted
            .send(server)
            .map_err(|_| io::Error::new(io::ErrorKind::ConnectionRefused, "relay stopped"))?;

        let client: Arc<dyn RelayTransport> = client;
        Ok(client)
    }
}

struct RelayShared {
    reply: Mutex<HelloReply>,
    peers: Mutex<HashMap<String, Arc<MemoryTransport>>>,
    links: Mutex<Vec<Arc<MemoryTransport>>>,
}

/// Minimal relay server: answers Hellos and forwards Transport messages
/// between registered clients, rewriting the destination id to the source id.
#[derive(Clone)]
pub(crate) struct TestRelay {
    dialer: Arc<MemoryDialer>,
    shared: Arc<RelayShared>,
}

impl TestRelay {
    pub(crate) fn start() -> Self {
        let (accepted, mut rx) = mpsc::unbounded_channel::<Arc<MemoryTransport>>();
        let shared = Arc::new(RelayShared {
            reply: Mutex::new(HelloReply::Accept),
            peers: Mutex::new(HashMap::new()),
            links: Mutex::new(Vec::new()),
        });

        let accept_shared = shared.clone();
        tokio::spawn(async move {
            while let Some(conn) = rx.recv().await {
                accept_shared.links.lock().unwrap().push(conn.clone());
                tokio::spawn(serve(accept_shared.clone(), conn));
            }
        });

        Self {
            dialer: Arc::new(MemoryDialer {
                accepted,
                dials: AtomicUsize::new(0),
                refuse: AtomicBool::new(false),
                fail_close: AtomicBool::new(false),
            }),
            shared,
        }
    }

    pub(crate) fn dialer(&self) -> Arc<dyn Dialer> {
        self.dialer.clone()
    }

    pub(crate) fn set_hello_reply(&self, reply: HelloReply) {
        *self.shared.reply.lock().unwrap() = reply;
    }

    pub(crate) fn refuse_dials(&self, refuse: bool) {
        self.dialer.refuse.store(refuse, Ordering::SeqCst);
    }

    pub(crate) fn dial_count(&self) -> usize {
        self.dialer.dials.load(Ordering::SeqCst)
    }

    /// Transports dialed from now on fail when the client closes them
    pub(crate) fn fail_client_close(&self, fail: bool) {
        self.dialer.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Whether each accepted connection has been torn down, in dial order
    pub(crate) fn links_severed(&self) -> Vec<bool> {
        self.shared
            .links
            .lock()
            .unwrap()
            .iter()
            .map(|link| link.is_severed())
            .collect()
    }

    /// Wait until the relay has accepted `count` connections
    pub(crate) async fn wait_links(&self, count: usize) {
        for _ in 0..500 {
            if self.shared.links.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("relay never accepted {} connections", count);
    }

    /// Abruptly drop every connection the relay has accepted
    pub(crate) fn sever_all(&self) {
        let links: Vec<_> = self.shared.links.lock().unwrap().drain(..).collect();
        self.shared.peers.lock().unwrap().clear();
        for link in links {
            link.sever();
        }
    }

    /// Send a raw message to the client registered as `peer`
    pub(crate) async fn send_raw(&self, peer: &str, msg: &[u8]) {
        let (_, id) = hash_id(peer);
        let conn = self.shared.peers.lock().unwrap().get(&id).cloned();
        conn.expect("peer not registered with relay")
            .send(msg)
            .await
            .unwrap();
    }

    /// Deliver `payload` to client `to` as if sent by client `from`
    pub(crate) async fn deliver(&self, from: &str, to: &str, payload: &[u8]) {
        let (src, _) = hash_id(from);
        self.send_raw(to, &marshal_transport_msg(&src, payload)).await;
    }

    /// Wait until `peer` completed a handshake with this relay
    pub(crate) async fn wait_registered(&self, peer: &str) {
        let (_, id) = hash_id(peer);
        for _ in 0..500 {
            if self.shared.peers.lock().unwrap().contains_key(&id) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("peer {} never registered", peer);
    }
}

async fn serve(shared: Arc<RelayShared>, conn: Arc<MemoryTransport>) {
    let mut buf = vec![0u8; 64 * 1024];
    let mut me: Option<PeerId> = None;

    loop {
        let n = match conn.recv(&mut buf).await {
            Ok(n) => n,
            Err(_) => break,
        };
        let msg = &buf[..n];

        match determine_client_msg_type(msg) {
            Ok(MsgType::Hello) => {
                let Ok(id) = unmarshal_hello_msg(msg) else {
                    continue;
                };
                let reply = *shared.reply.lock().unwrap();
                match reply {
                    HelloReply::Accept => {
                        shared
                            .peers
                            .lock()
                            .unwrap()
                            .insert(hash_id_to_string(&id), conn.clone());
                        me = Some(id);
                        let _ = conn.send(&marshal_hello_response()).await;
                    }
                    HelloReply::WrongType => {
                        let _ = conn.send(&marshal_transport_msg(&id, b"nope")).await;
                    }
                    HelloReply::Silent => {}
                }
            }
            Ok(MsgType::Transport) => {
                let (Some(src), Ok(dst), Ok(payload)) = (
                    me,
                    unmarshal_transport_id(msg),
                    unmarshal_transport_payload(msg),
                ) else {
                    continue;
                };
                let target = shared
                    .peers
                    .lock()
                    .unwrap()
                    .get(&hash_id_to_string(&dst))
                    .cloned();
                if let Some(target) = target {
                    let _ = target.send(&marshal_transport_msg(&src, payload)).await;
                }
            }
            _ => {}
        }
    }
}
