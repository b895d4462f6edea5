use async_trait::async_trait;
use mysql_broadcast::config::SupervisorSettings;
use mysql_broadcast::error::{Fault, SupervisorError};
use mysql_broadcast::lifecycle::{FaultReceiver, fault_channel};
use mysql_broadcast::mysql::supervisor::spawn;
use mysql_broadcast::mysql::{
    Connector, DatabaseSession, Launcher, MysqlSupervisorHandle, SupervisorStatus,
};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicUsize, Ordering},
};
use std::time::{Duration, Instant};

/// In-memory stand-in for the `mysql.func` catalog.
#[derive(Default)]
struct Catalog {
    functions: AtomicI64,
    checks: AtomicUsize,
    installs: AtomicUsize,
    fail_check: bool,
    fail_install: bool,
    /// Flipped to simulate the server dropping the session.
    fail_ping: AtomicBool,
}

#[derive(Clone)]
struct FakeSession {
    /// Which connection attempt produced this session.
    attempt: u32,
    catalog: Arc<Catalog>,
}

#[async_trait]
impl DatabaseSession for FakeSession {
    async fn count_extension_functions(&self, _library: &str) -> Result<i64, sqlx::Error> {
        self.catalog.checks.fetch_add(1, Ordering::SeqCst);
        if self.catalog.fail_check {
            return Err(sqlx::Error::Protocol("mysql.func unreadable".into()));
        }
        Ok(self.catalog.functions.load(Ordering::SeqCst))
    }

    async fn install_extension(&self, _library: &str) -> Result<(), sqlx::Error> {
        self.catalog.installs.fetch_add(1, Ordering::SeqCst);
        if self.catalog.fail_install {
            return Err(sqlx::Error::Protocol("CREATE FUNCTION denied".into()));
        }
        self.catalog.functions.store(4, Ordering::SeqCst);
        Ok(())
    }

    async fn ping(&self) -> Result<(), sqlx::Error> {
        if self.catalog.fail_ping.load(Ordering::SeqCst) {
            return Err(sqlx::Error::PoolClosed);
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Step {
    Fail,
    Succeed,
    SucceedAfter(Duration),
}

struct ScriptedConnector {
    script: Mutex<Vec<Step>>,
    attempts: Arc<AtomicU32>,
    catalog: Arc<Catalog>,
}

impl ScriptedConnector {
    fn new(script: Vec<Step>, catalog: Arc<Catalog>) -> (Self, Arc<AtomicU32>) {
        let attempts = Arc::new(AtomicU32::new(0));
        let connector = Self {
            script: Mutex::new(script),
            attempts: attempts.clone(),
            catalog,
        };
        (connector, attempts)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    type Conn = FakeSession;

    async fn connect(&self) -> Result<FakeSession, sqlx::Error> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let step = {
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                Step::Fail
            } else {
                script.remove(0)
            }
        };
        let session = FakeSession {
            attempt,
            catalog: self.catalog.clone(),
        };
        match step {
            Step::Fail => Err(sqlx::Error::Protocol("mysqld not accepting connections".into())),
            Step::Succeed => Ok(session),
            Step::SucceedAfter(delay) => {
                tokio::time::sleep(delay).await;
                Ok(session)
            }
        }
    }
}

fn settings() -> SupervisorSettings {
    SupervisorSettings {
        connect_timeout: Duration::from_millis(50),
        retry_interval: Duration::from_millis(60),
        max_attempts: 3,
        shutdown_timeout: Duration::from_millis(500),
        udf_library: "mysql-udf-http.so".to_string(),
        health_check_interval: None,
    }
}

fn sleeper() -> Launcher {
    Launcher::new("sleep", vec!["30".to_string()])
}

fn installed_catalog() -> Arc<Catalog> {
    let catalog = Catalog::default();
    catalog.functions.store(4, Ordering::SeqCst);
    Arc::new(catalog)
}

async fn supervisor(
    settings: SupervisorSettings,
    launcher: Launcher,
    connector: ScriptedConnector,
) -> (MysqlSupervisorHandle<FakeSession>, FaultReceiver) {
    let (faults, fault_rx) = fault_channel();
    let handle = spawn(settings, launcher, connector, faults)
        .await
        .expect("supervisor actor should spawn");
    (handle, fault_rx)
}

#[tokio::test]
async fn start_succeeds_after_failed_attempts_and_checks_once() {
    let catalog = installed_catalog();
    let (connector, attempts) = ScriptedConnector::new(
        vec![Step::Fail, Step::Fail, Step::Succeed],
        catalog.clone(),
    );
    let (sup, _faults) = supervisor(settings(), sleeper(), connector).await;

    assert_eq!(sup.status(), SupervisorStatus::Unstarted);
    assert!(sup.connection().is_none());

    sup.start().await.expect("start should succeed on the third attempt");

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(catalog.checks.load(Ordering::SeqCst), 1);
    assert_eq!(catalog.installs.load(Ordering::SeqCst), 0);
    assert_eq!(sup.status(), SupervisorStatus::Ready);
    assert_eq!(sup.connection().map(|c| c.attempt), Some(3));

    sup.destroy().await;
    assert_eq!(sup.status(), SupervisorStatus::Stopped);
    assert!(sup.connection().is_none());
}

#[tokio::test]
async fn start_fails_after_retry_budget_and_clears_process() {
    let catalog = installed_catalog();
    let (connector, attempts) =
        ScriptedConnector::new(vec![Step::Fail, Step::Fail, Step::Fail], catalog.clone());
    let (sup, _faults) = supervisor(settings(), sleeper(), connector).await;

    let err = sup.start().await.expect_err("start should give up");
    assert!(
        matches!(err, SupervisorError::DatabaseUnavailable { attempts: 3 }),
        "unexpected error: {err:?}"
    );
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(catalog.checks.load(Ordering::SeqCst), 0);
    assert_eq!(sup.status(), SupervisorStatus::Stopped);
    assert!(sup.connection().is_none());

    // Nothing left to stop.
    sup.destroy().await;
    assert_eq!(sup.status(), SupervisorStatus::Stopped);
}

#[tokio::test]
async fn second_start_reuses_established_state() {
    let catalog = installed_catalog();
    let (connector, attempts) = ScriptedConnector::new(vec![Step::Succeed], catalog.clone());
    let (sup, _faults) = supervisor(settings(), sleeper(), connector).await;

    sup.start().await.expect("first start");
    sup.start().await.expect("second start");

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(catalog.checks.load(Ordering::SeqCst), 1);
    assert_eq!(sup.status(), SupervisorStatus::Ready);

    sup.destroy().await;
}

#[tokio::test]
async fn concurrent_starts_run_the_sequence_once() {
    let catalog = installed_catalog();
    let (connector, attempts) = ScriptedConnector::new(vec![Step::Succeed], catalog.clone());
    let (sup, _faults) = supervisor(settings(), sleeper(), connector).await;

    let (a, b) = tokio::join!(sup.start(), sup.start());
    a.expect("first start");
    b.expect("second start");

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(catalog.checks.load(Ordering::SeqCst), 1);

    sup.destroy().await;
}

#[tokio::test]
async fn missing_functions_are_installed_once() {
    let catalog = Arc::new(Catalog::default());
    catalog.functions.store(2, Ordering::SeqCst);
    let (connector, _attempts) = ScriptedConnector::new(vec![Step::Succeed], catalog.clone());
    let (sup, _faults) = supervisor(settings(), sleeper(), connector).await;

    sup.start().await.expect("start should install the extension");

    assert_eq!(catalog.installs.load(Ordering::SeqCst), 1);
    let conn = sup.connection().expect("connection published after start");
    assert_eq!(
        conn.count_extension_functions("mysql-udf-http.so").await.unwrap(),
        4
    );

    sup.destroy().await;
}

#[tokio::test]
async fn extension_check_error_fails_start() {
    let catalog = Arc::new(Catalog {
        fail_check: true,
        ..Default::default()
    });
    let (connector, _attempts) = ScriptedConnector::new(vec![Step::Succeed], catalog.clone());
    let (sup, _faults) = supervisor(settings(), sleeper(), connector).await;

    let err = sup.start().await.expect_err("check error is fatal");
    assert!(matches!(err, SupervisorError::ExtensionCheck(_)));
    assert_eq!(catalog.installs.load(Ordering::SeqCst), 0);
    assert!(sup.connection().is_none());
    assert_eq!(sup.status(), SupervisorStatus::Stopped);
}

#[tokio::test]
async fn extension_install_error_fails_start() {
    let catalog = Arc::new(Catalog {
        fail_install: true,
        ..Default::default()
    });
    let (connector, _attempts) = ScriptedConnector::new(vec![Step::Succeed], catalog.clone());
    let (sup, _faults) = supervisor(settings(), sleeper(), connector).await;

    let err = sup.start().await.expect_err("install error is fatal");
    assert!(matches!(err, SupervisorError::ExtensionInstall(_)));
    assert_eq!(catalog.checks.load(Ordering::SeqCst), 1);
    assert_eq!(catalog.installs.load(Ordering::SeqCst), 1);
    assert!(sup.connection().is_none());
    assert_eq!(sup.status(), SupervisorStatus::Stopped);
}

#[tokio::test]
async fn superseded_attempt_result_is_ignored() {
    // Ticks at 300ms and 600ms. The first attempt resolves at 700ms, after the
    // second tick has superseded it; the second resolves at 800ms, before the
    // third tick.
    let catalog = installed_catalog();
    let (connector, attempts) = ScriptedConnector::new(
        vec![
            Step::SucceedAfter(Duration::from_millis(400)),
            Step::SucceedAfter(Duration::from_millis(200)),
        ],
        catalog.clone(),
    );
    let settings = SupervisorSettings {
        connect_timeout: Duration::from_secs(1),
        retry_interval: Duration::from_millis(300),
        ..settings()
    };
    let (sup, _faults) = supervisor(settings, sleeper(), connector).await;

    sup.start().await.expect("start should succeed");

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(sup.connection().map(|c| c.attempt), Some(2));
    assert_eq!(catalog.checks.load(Ordering::SeqCst), 1);

    sup.destroy().await;
}

#[tokio::test]
async fn failed_health_check_reports_connection_fault() {
    let catalog = installed_catalog();
    let (connector, _attempts) = ScriptedConnector::new(vec![Step::Succeed], catalog.clone());
    let settings = SupervisorSettings {
        health_check_interval: Some(Duration::from_millis(50)),
        ..settings()
    };
    let (sup, mut faults) = supervisor(settings, sleeper(), connector).await;

    sup.start().await.expect("start should succeed");
    catalog.fail_ping.store(true, Ordering::SeqCst);

    let fault = tokio::time::timeout(Duration::from_secs(2), faults.recv())
        .await
        .expect("fault should arrive")
        .expect("fault channel open");
    assert!(
        matches!(fault, Fault::Connection(_)),
        "unexpected fault: {fault:?}"
    );

    sup.destroy().await;
}

#[tokio::test]
async fn destroy_before_start_is_a_noop() {
    let (connector, attempts) = ScriptedConnector::new(vec![], installed_catalog());
    let (sup, _faults) = supervisor(settings(), sleeper(), connector).await;

    sup.destroy().await;
    sup.destroy().await;

    assert_eq!(attempts.load(Ordering::SeqCst), 0);
    assert_eq!(sup.status(), SupervisorStatus::Unstarted);
}

#[tokio::test]
async fn destroy_resolves_when_server_ignores_sigterm() {
    let launcher = Launcher::new(
        "sh",
        vec!["-c".to_string(), "trap '' TERM; exec sleep 30".to_string()],
    );
    let settings = SupervisorSettings {
        shutdown_timeout: Duration::from_millis(200),
        ..settings()
    };
    let (connector, _attempts) = ScriptedConnector::new(vec![Step::Succeed], installed_catalog());
    let (sup, _faults) = supervisor(settings, launcher, connector).await;

    sup.start().await.expect("start");

    let begun = Instant::now();
    sup.destroy().await;
    assert!(begun.elapsed() < Duration::from_secs(2));
    assert_eq!(sup.status(), SupervisorStatus::Stopped);
    assert!(sup.connection().is_none());

    // A second destroy has nothing left to do.
    sup.destroy().await;
    assert_eq!(sup.status(), SupervisorStatus::Stopped);
}

#[tokio::test]
async fn unexpected_exit_after_start_is_reported_as_fault() {
    let launcher = Launcher::new("sleep", vec!["0.5".to_string()]);
    let (connector, _attempts) = ScriptedConnector::new(vec![Step::Succeed], installed_catalog());
    let (sup, mut faults) = supervisor(settings(), launcher, connector).await;

    sup.start().await.expect("start");

    let fault = tokio::time::timeout(Duration::from_secs(5), faults.recv())
        .await
        .expect("fault should arrive")
        .expect("fault channel open");
    assert!(
        matches!(fault, Fault::ProcessExited { status } if status.success()),
        "unexpected fault: {fault:?}"
    );

    sup.destroy().await;
}

#[tokio::test]
async fn requested_stop_is_not_a_fault() {
    let (connector, _attempts) = ScriptedConnector::new(vec![Step::Succeed], installed_catalog());
    let (sup, mut faults) = supervisor(settings(), sleeper(), connector).await;

    sup.start().await.expect("start");
    sup.destroy().await;

    let res = tokio::time::timeout(Duration::from_millis(200), faults.recv()).await;
    assert!(res.is_err(), "no fault expected after destroy, got {res:?}");
}

#[tokio::test]
async fn spawn_failure_fails_start() {
    let launcher = Launcher::new("/nonexistent/mysqld-entrypoint", vec![]);
    let (connector, attempts) = ScriptedConnector::new(vec![Step::Succeed], installed_catalog());
    let (sup, _faults) = supervisor(settings(), launcher, connector).await;

    let err = sup.start().await.expect_err("spawn should fail");
    assert!(matches!(err, SupervisorError::Spawn(_)));
    assert_eq!(attempts.load(Ordering::SeqCst), 0);
}
