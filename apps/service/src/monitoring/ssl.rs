use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, TimeDelta, Utc};
use rustls::pki_types::{CertificateDer, ServerName};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, error};
use url::{Host, Url};

use super::types::{CertificateInfo, SslValidationError};
use crate::database::Database;
use crate::database::models::Monitor;
use crate::events::{EventDispatcher, MonitorEvent, SslOutcome};

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Retrieves and checks the certificate served for a URL
#[async_trait::async_trait]
pub trait SslValidator: Send + Sync {
    async fn validate(&self, url: &str) -> Result<CertificateInfo, SslValidationError>;
}

/// Validates with a full rustls handshake against the webpki roots.
///
/// An untrusted chain, an expired certificate or a host name mismatch all
/// fail the handshake and come back as [`SslValidationError::Handshake`].
pub struct RustlsSslValidator {
    connector: TlsConnector,
    timeout: Duration,
}

impl RustlsSslValidator {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_extra_roots(timeout, Vec::new())
    }

    pub fn with_extra_roots(timeout: Duration, extra_roots: Vec<CertificateDer<'static>>) -> Result<Self> {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        for root in extra_roots {
            roots.add(root)?;
        }

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(Self { connector: TlsConnector::from(Arc::new(config)), timeout })
    }

    async fn fetch_certificate(
        &self,
        host: String,
        port: u16,
        server_name: ServerName<'static>,
    ) -> Result<CertificateInfo, SslValidationError> {
        let stream = TcpStream::connect((host.as_str(), port))
            .await
            .map_err(|e| SslValidationError::Connect(e.to_string()))?;

        let tls = self
            .connector
            .connect(server_name, stream)
            .await
            .map_err(|e| SslValidationError::Handshake(e.to_string()))?;

        let (_, connection) = tls.get_ref();
        let leaf = connection
            .peer_certificates()
            .and_then(|chain| chain.first())
            .ok_or(SslValidationError::MissingCertificate)?;

        parse_certificate(leaf.as_ref())
    }
}

#[async_trait::async_trait]
impl SslValidator for RustlsSslValidator {
    async fn validate(&self, url: &str) -> Result<CertificateInfo, SslValidationError> {
        let (host, port, server_name) = target_of(url)?;
        debug!(%host, port, "Validating certificate");

        tokio::time::timeout(self.timeout, self.fetch_certificate(host, port, server_name))
            .await
            .map_err(|_| SslValidationError::Connect(format!("Timed out after {:?}", self.timeout)))?
    }
}

fn target_of(raw: &str) -> Result<(String, u16, ServerName<'static>), SslValidationError> {
    let url = Url::parse(raw).map_err(|e| SslValidationError::InvalidUrl(format!("{raw}: {e}")))?;
    if url.scheme() != "https" {
        return Err(SslValidationError::InvalidUrl(format!("{raw}: not an https URL")));
    }
    let port = url.port_or_known_default().unwrap_or(443);

    let (host, server_name) = match url.host() {
        Some(Host::Domain(domain)) => {
            let name = ServerName::try_from(domain.to_string())
                .map_err(|e| SslValidationError::InvalidUrl(format!("{raw}: {e}")))?;
            (domain.to_string(), name)
        }
        Some(Host::Ipv4(ip)) => (ip.to_string(), ServerName::from(IpAddr::V4(ip))),
        Some(Host::Ipv6(ip)) => (ip.to_string(), ServerName::from(IpAddr::V6(ip))),
        None => return Err(SslValidationError::InvalidUrl(format!("{raw}: missing host"))),
    };

    Ok((host, port, server_name))
}

fn parse_certificate(der: &[u8]) -> Result<CertificateInfo, SslValidationError> {
    let (_, certificate) = x509_parser::parse_x509_certificate(der)
        .map_err(|e| SslValidationError::Parse(e.to_string()))?;

    let not_after = certificate.validity().not_after.timestamp();
    let valid_to = DateTime::from_timestamp(not_after, 0)
        .ok_or_else(|| SslValidationError::Parse(format!("notAfter out of range: {not_after}")))?;

    Ok(CertificateInfo { valid_to })
}

/// INVALID on error, WILL_EXPIRE inside the threshold window, VALID otherwise
pub fn classify(
    result: Result<CertificateInfo, SslValidationError>,
    expiry_threshold_days: u32,
    now: DateTime<Utc>,
) -> SslOutcome {
    match result {
        Err(error) => SslOutcome::Invalid(error),
        Ok(info) if info.valid_to < now + TimeDelta::days(i64::from(expiry_threshold_days)) => {
            SslOutcome::WillExpire(info)
        }
        Ok(info) => SslOutcome::Valid(info),
    }
}

/// Runs the certificate check of a monitor that is currently up
pub struct SslChecker {
    validator: Arc<dyn SslValidator>,
    dispatcher: Arc<EventDispatcher>,
    db: Arc<dyn Database>,
}

impl SslChecker {
    pub fn new(validator: Arc<dyn SslValidator>, dispatcher: Arc<EventDispatcher>, db: Arc<dyn Database>) -> Self {
        Self { validator, dispatcher, db }
    }

    pub async fn check(&self, monitor: &Monitor) {
        match self.db.is_monitor_up(monitor.id, true).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(monitor_id = monitor.id, "Monitor is down, skipping SSL check");
                return;
            }
            Err(e) => {
                error!(monitor_id = monitor.id, "Failed to read uptime status: {e:#}");
                return;
            }
        }

        let previous = match self.db.get_previous_ssl_event(monitor.id).await {
            Ok(previous) => previous,
            Err(e) => {
                error!(monitor_id = monitor.id, "Failed to look up the previous SSL event: {e:#}");
                return;
            }
        };

        let result = self.validator.validate(&monitor.url).await;
        let outcome = classify(result, monitor.ssl_expiry_threshold, Utc::now());
        self.dispatcher.dispatch(MonitorEvent::ssl(monitor.clone(), outcome, previous)).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rcgen::{BasicConstraints, CertificateParams, IsCa, KeyPair};
    use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
    use tokio::net::TcpListener;
    use tokio_rustls::TlsAcceptor;

    use super::*;
    use crate::database::memory::MemoryDatabase;
    use crate::database::models::{NewMonitor, NewUptimeEvent};
    use crate::database::{MonitorRepository, UptimeEventRepository};
    use crate::events::dispatcher::tests::RecordingHandler;
    use crate::events::{EventFilter, EventKind};
    use crate::monitoring::types::UptimeStatus;

    struct TestTlsServer {
        port: u16,
        ca: CertificateDer<'static>,
    }

    /// Serves a leaf for `localhost`, signed by a throwaway CA, expiring at the given year
    async fn start_tls_server(expiry_year: i32) -> anyhow::Result<TestTlsServer> {
        let ca_key = KeyPair::generate()?;
        let mut ca_params = CertificateParams::new(Vec::<String>::new())?;
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let ca_cert = ca_params.self_signed(&ca_key)?;

        let leaf_key = KeyPair::generate()?;
        let mut leaf_params = CertificateParams::new(vec!["localhost".to_string()])?;
        leaf_params.not_after = rcgen::date_time_ymd(expiry_year, 1, 1);
        let leaf_cert = leaf_params.signed_by(&leaf_key, &ca_cert, &ca_key)?;

        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(leaf_key.serialize_der()));
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = rustls::ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(vec![leaf_cert.der().clone()], key)?;
        let acceptor = TlsAcceptor::from(Arc::new(config));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    let _ = acceptor.accept(stream).await;
                });
            }
        });

        Ok(TestTlsServer { port, ca: ca_cert.der().clone() })
    }

    #[tokio::test]
    async fn test_trusted_certificate_reports_expiry() -> anyhow::Result<()> {
        let server = start_tls_server(2040).await?;
        let validator = RustlsSslValidator::with_extra_roots(Duration::from_secs(5), vec![server.ca])?;

        let info = validator.validate(&format!("https://localhost:{}/", server.port)).await?;
        assert_eq!(info.valid_to.format("%Y-%m-%d").to_string(), "2040-01-01");
        Ok(())
    }

    #[tokio::test]
    async fn test_untrusted_certificate_fails_handshake() -> anyhow::Result<()> {
        let server = start_tls_server(2040).await?;
        let validator = RustlsSslValidator::new(Duration::from_secs(5))?;

        let result = validator.validate(&format!("https://localhost:{}/", server.port)).await;
        assert!(matches!(result, Err(SslValidationError::Handshake(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_plain_http_url_is_rejected() -> anyhow::Result<()> {
        let validator = RustlsSslValidator::new(Duration::from_secs(5))?;
        let result = validator.validate("http://example.test").await;
        assert!(matches!(result, Err(SslValidationError::InvalidUrl(_))));
        Ok(())
    }

    #[test]
    fn test_classification_by_threshold() {
        let now = Utc::now();
        let soon = CertificateInfo { valid_to: now + TimeDelta::days(10) };
        let later = CertificateInfo { valid_to: now + TimeDelta::days(60) };

        assert!(matches!(classify(Ok(soon), 30, now), SslOutcome::WillExpire(_)));
        assert!(matches!(classify(Ok(later), 30, now), SslOutcome::Valid(_)));
        assert!(matches!(classify(Ok(soon), 5, now), SslOutcome::Valid(_)));
        assert!(matches!(
            classify(Err(SslValidationError::MissingCertificate), 30, now),
            SslOutcome::Invalid(_)
        ));
    }

    struct FakeValidator {
        result: Result<CertificateInfo, SslValidationError>,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl SslValidator for FakeValidator {
        async fn validate(&self, _: &str) -> Result<CertificateInfo, SslValidationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    async fn ssl_fixture(
        result: Result<CertificateInfo, SslValidationError>,
    ) -> (SslChecker, Arc<FakeValidator>, Arc<RecordingHandler>, Arc<MemoryDatabase>, Monitor) {
        let db = Arc::new(MemoryDatabase::new());
        let dispatcher = Arc::new(EventDispatcher::new());
        let recorder = Arc::new(RecordingHandler::default());
        dispatcher.subscribe(EventFilter::Ssl, recorder.clone()).await;

        let validator = Arc::new(FakeValidator { result, calls: AtomicUsize::new(0) });
        let checker = SslChecker::new(validator.clone(), dispatcher, db.clone());

        let mut new_monitor = NewMonitor::new("secure", "https://secure.test");
        new_monitor.ssl_check_enabled = true;
        let monitor = db.insert_monitor(&new_monitor).await.unwrap();
        (checker, validator, recorder, db, monitor)
    }

    #[tokio::test]
    async fn test_new_monitor_is_assumed_up() -> anyhow::Result<()> {
        let info = CertificateInfo { valid_to: Utc::now() + TimeDelta::days(90) };
        let (checker, validator, recorder, _db, monitor) = ssl_fixture(Ok(info)).await;

        checker.check(&monitor).await;

        assert_eq!(validator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.kinds(), vec![EventKind::SslValid]);
        Ok(())
    }

    #[tokio::test]
    async fn test_down_monitor_is_skipped() -> anyhow::Result<()> {
        let info = CertificateInfo { valid_to: Utc::now() + TimeDelta::days(90) };
        let (checker, validator, recorder, db, monitor) = ssl_fixture(Ok(info)).await;
        db.insert_uptime_event(&NewUptimeEvent {
            monitor_id: monitor.id,
            status: UptimeStatus::Down,
            error: Some("500 Internal Server Error".into()),
            started_at: Utc::now(),
        })
        .await?;

        checker.check(&monitor).await;

        assert_eq!(validator.calls.load(Ordering::SeqCst), 0);
        assert!(recorder.kinds().is_empty());
        assert!(db.ssl_events(monitor.id).is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_validation_error_is_invalid() -> anyhow::Result<()> {
        let error = SslValidationError::Handshake("certificate expired".into());
        let (checker, _, recorder, _db, monitor) = ssl_fixture(Err(error)).await;

        checker.check(&monitor).await;

        assert_eq!(recorder.kinds(), vec![EventKind::SslInvalid]);
        Ok(())
    }
}
