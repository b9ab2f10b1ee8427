use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rcgen::{BasicConstraints, Certificate, CertificateParams, IsCa, KeyPair};
use rustls::crypto::ring;
use rustls::ServerConfig;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

use kafka_sentinel::config::Config;
use kafka_sentinel::kafka::{
    event_channels, BrokerSession, ClientError, ClientEvent, ConnectPlan, Connected, Connector,
    EventSinks, InboundRecord,
};

/// A certificate authority able to sign broker and client certificates
pub struct TestCa {
    cert: Certificate,
    key: KeyPair,
}

#[allow(dead_code)]
impl TestCa {
    pub fn new() -> Self {
        let key = KeyPair::generate().expect("failed to generate CA key");
        let mut params = CertificateParams::new(Vec::<String>::new()).expect("bad CA params");
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let cert = params.self_signed(&key).expect("failed to self-sign CA");
        Self { cert, key }
    }

    pub fn pem(&self) -> String {
        self.cert.pem()
    }

    /// Issue a leaf certificate, returning (cert PEM, key PEM)
    pub fn issue(&self, name: &str) -> (String, String) {
        let key = KeyPair::generate().expect("failed to generate leaf key");
        let cert = CertificateParams::new(vec![name.to_string()])
            .expect("bad leaf params")
            .signed_by(&key, &self.cert, &self.key)
            .expect("failed to sign leaf");
        (cert.pem(), key.serialize_pem())
    }
}

/// A TLS listener on 127.0.0.1 that completes handshakes and discards data
pub struct TlsBroker {
    pub addr: SocketAddr,
    pub handshakes: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl TlsBroker {
    pub fn url(&self) -> String {
        format!("kafka+ssl://{}", self.addr)
    }
}

/// Serve TLS with a certificate for `name` issued by `ca`
#[allow(dead_code)]
pub async fn spawn_broker(ca: &TestCa, name: &str) -> TlsBroker {
    let (cert_pem, key_pem) = ca.issue(name);
    spawn_broker_with(&cert_pem, &key_pem).await
}

#[allow(dead_code)]
pub async fn spawn_broker_with(cert_pem: &str, key_pem: &str) -> TlsBroker {
    let chain = rustls_pemfile::certs(&mut cert_pem.as_bytes())
        .collect::<Result<Vec<_>, _>>()
        .expect("bad server cert");
    let key = rustls_pemfile::private_key(&mut key_pem.as_bytes())
        .expect("bad server key")
        .expect("no server key");

    let config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .expect("bad protocol versions")
        .with_no_client_auth()
        .with_single_cert(chain, key)
        .expect("bad server config");
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().expect("no local addr");
    let handshakes = Arc::new(AtomicUsize::new(0));

    let counter = handshakes.clone();
    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            let counter = counter.clone();
            tokio::spawn(async move {
                if let Ok(mut stream) = acceptor.accept(tcp).await {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let mut buf = [0u8; 256];
                    while matches!(stream.read(&mut buf).await, Ok(n) if n > 0) {}
                }
            });
        }
    });

    TlsBroker { addr, handshakes }
}

/// An address nothing is listening on
#[allow(dead_code)]
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    listener.local_addr().expect("no local addr")
}

/// Configuration pointing at `urls`, with base64 material trusting `ca`
#[allow(dead_code)]
pub fn config_for(ca: &TestCa, urls: &[String]) -> Config {
    let (client_cert, client_key) = ca.issue("sentinel-client");
    let mut config = Config::default();
    config.environment = "test".to_string();
    config.kafka.url = urls.join(",");
    config.kafka.tls.trusted_cert = STANDARD.encode(ca.pem());
    config.kafka.tls.client_cert = STANDARD.encode(client_cert);
    config.kafka.tls.client_cert_key = STANDARD.encode(client_key);
    config.kafka.verify_timeout_secs = 5;
    config.shutdown.drain_timeout_secs = 2;
    config
}

/// In-memory connector counting how often it was asked to connect
#[derive(Default)]
pub struct FakeConnector {
    pub calls: AtomicUsize,
    pub records: Vec<InboundRecord>,
    pub events: Vec<ClientEvent>,
    pub hold_open: bool,
    pub session: Mutex<Option<Arc<FakeSession>>>,
}

#[allow(dead_code)]
impl FakeConnector {
    pub fn with_records(records: Vec<InboundRecord>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn session(&self) -> Arc<FakeSession> {
        self.session
            .lock()
            .unwrap()
            .clone()
            .expect("connector was never called")
    }
}

impl Connector for FakeConnector {
    type Session = FakeSession;

    fn connect(&self, plan: &ConnectPlan) -> Result<Connected<FakeSession>, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (sinks, events) = event_channels();

        for event in &self.events {
            let sink = match event {
                ClientEvent::Rebalance { .. } => &sinks.consumer_notifications,
                ClientEvent::Delivered { .. } => &sinks.producer_successes,
                ClientEvent::ConsumerError(_) => &sinks.consumer_errors,
                ClientEvent::ProducerError(_) => &sinks.producer_errors,
            };
            sink.emit(event.clone());
        }

        let session = Arc::new(FakeSession {
            topic: plan.topic.clone(),
            records: Mutex::new(Some(self.records.clone())),
            hold_open: self.hold_open,
            sinks,
            published: Mutex::new(Vec::new()),
            producer_closes: AtomicUsize::new(0),
            consumer_closes: AtomicUsize::new(0),
        });
        *self.session.lock().unwrap() = Some(session.clone());

        Ok(Connected { session, events })
    }
}

/// In-memory session replaying a fixed list of records
pub struct FakeSession {
    pub topic: String,
    records: Mutex<Option<Vec<InboundRecord>>>,
    hold_open: bool,
    sinks: EventSinks,
    pub published: Mutex<Vec<(String, Vec<u8>)>>,
    pub producer_closes: AtomicUsize,
    pub consumer_closes: AtomicUsize,
}

#[allow(dead_code)]
impl FakeSession {
    pub fn producer_closes(&self) -> usize {
        self.producer_closes.load(Ordering::SeqCst)
    }

    pub fn consumer_closes(&self) -> usize {
        self.consumer_closes.load(Ordering::SeqCst)
    }
}

impl BrokerSession for FakeSession {
    fn messages(self: Arc<Self>, cancel: CancellationToken) -> mpsc::Receiver<InboundRecord> {
        let (tx, rx) = mpsc::channel(16);
        let records = self.records.lock().unwrap().take().unwrap_or_default();
        let hold_open = self.hold_open;

        tokio::spawn(async move {
            for record in records {
                if tx.send(record).await.is_err() {
                    return;
                }
            }
            if hold_open {
                cancel.cancelled().await;
            }
        });
        rx
    }

    fn publish(&self, topic: &str, _key: Option<&[u8]>, payload: &[u8]) -> Result<(), ClientError> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload.to_vec()));
        self.sinks.producer_successes.emit(ClientEvent::Delivered {
            topic: topic.to_string(),
            partition: 0,
            offset: 0,
            payload: payload.to_vec(),
        });
        Ok(())
    }

    fn close_producer(&self, _flush_timeout: Duration) -> Result<(), ClientError> {
        self.producer_closes.fetch_add(1, Ordering::SeqCst);
        self.sinks.close_producer();
        Ok(())
    }

    fn close_consumer(&self) -> Result<(), ClientError> {
        self.consumer_closes.fetch_add(1, Ordering::SeqCst);
        self.sinks.close_consumer();
        Ok(())
    }
}

/// A record on `order_events`
#[allow(dead_code)]
pub fn record(partition: i32, offset: i64, payload: Option<&str>) -> InboundRecord {
    InboundRecord {
        topic: "order_events".to_string(),
        partition,
        offset,
        key: None,
        payload: payload.map(|p| p.as_bytes().to_vec()),
    }
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("sentinel.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}
