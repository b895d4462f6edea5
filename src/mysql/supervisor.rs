use super::connector::Connector;
use super::extension::{DatabaseSession, ensure_extension};
use super::launcher::{Launcher, ServerProcess};
use super::retry::{ConnectRetry, Tick};
use crate::config::SupervisorSettings;
use crate::error::{Fault, IsRetryable, ServiceError, SupervisorError};
use crate::lifecycle::{FaultSender, Service};
use async_trait::async_trait;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use std::{marker::PhantomData, sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorStatus {
    Unstarted,
    Starting,
    Ready,
    Stopping,
    Stopped,
}

#[derive(Debug)]
pub enum SupervisorMessage {
    /// Spawn, connect and verify the extension. Replies once ready or failed.
    Start(RpcReplyPort<Result<(), SupervisorError>>),

    /// Stop the server (best effort, bounded by the shutdown deadline) and clear handles.
    Destroy(RpcReplyPort<()>),
}

/// Handle for driving the supervisor and reading the published connection.
#[derive(Clone)]
pub struct MysqlSupervisorHandle<T> {
    actor: ActorRef<SupervisorMessage>,
    conn_rx: watch::Receiver<Option<T>>,
    status_rx: watch::Receiver<SupervisorStatus>,
}

impl<T: Clone> MysqlSupervisorHandle<T> {
    pub async fn start(&self) -> Result<(), SupervisorError> {
        ractor::call!(self.actor, SupervisorMessage::Start)
            .map_err(|e| SupervisorError::RactorError(format!("Start RPC failed: {e}")))?
    }

    /// Always completes; failures during shutdown are logged only.
    pub async fn destroy(&self) {
        if let Err(e) = ractor::call!(self.actor, SupervisorMessage::Destroy) {
            warn!(error = %e, "Destroy RPC failed; supervisor already gone");
        }
    }

    /// The live session, or `None` until `start` has resolved successfully.
    pub fn connection(&self) -> Option<T> {
        self.conn_rx.borrow().clone()
    }

    pub fn status(&self) -> SupervisorStatus {
        *self.status_rx.borrow()
    }
}

#[async_trait]
impl<T> Service for MysqlSupervisorHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "mysql-supervisor"
    }

    async fn start(&self) -> Result<(), ServiceError> {
        MysqlSupervisorHandle::start(self).await?;
        Ok(())
    }

    async fn destroy(&self) -> Result<(), ServiceError> {
        MysqlSupervisorHandle::destroy(self).await;
        Ok(())
    }
}

pub async fn spawn<C: Connector>(
    settings: SupervisorSettings,
    launcher: Launcher,
    connector: C,
    faults: FaultSender,
) -> Result<MysqlSupervisorHandle<C::Conn>, SupervisorError> {
    let (conn_tx, conn_rx) = watch::channel(None);
    let (status_tx, status_rx) = watch::channel(SupervisorStatus::Unstarted);

    let args = SupervisorArgs {
        settings,
        launcher,
        connector: Arc::new(connector),
        faults,
        conn_tx,
        status_tx,
    };

    let (actor, _jh) = Actor::spawn(None, SupervisorActor::<C>(PhantomData), args)
        .await
        .map_err(|e| SupervisorError::RactorError(format!("supervisor spawn failed: {e}")))?;

    Ok(MysqlSupervisorHandle {
        actor,
        conn_rx,
        status_rx,
    })
}

struct SupervisorArgs<C: Connector> {
    settings: SupervisorSettings,
    launcher: Launcher,
    connector: Arc<C>,
    faults: FaultSender,
    conn_tx: watch::Sender<Option<C::Conn>>,
    status_tx: watch::Sender<SupervisorStatus>,
}

struct SupervisorState<C: Connector> {
    settings: SupervisorSettings,
    launcher: Launcher,
    connector: Arc<C>,
    faults: FaultSender,
    conn_tx: watch::Sender<Option<C::Conn>>,
    status_tx: watch::Sender<SupervisorStatus>,
    process: Option<ServerProcess>,
    watchdog: Option<JoinHandle<()>>,
}

impl<C: Connector> SupervisorState<C> {
    fn status(&self) -> SupervisorStatus {
        *self.status_tx.borrow()
    }

    fn set_status(&self, status: SupervisorStatus) {
        self.status_tx.send_replace(status);
    }
}

struct SupervisorActor<C>(PhantomData<fn() -> C>);

#[ractor::async_trait]
impl<C: Connector> Actor for SupervisorActor<C> {
    type Msg = SupervisorMessage;
    type State = SupervisorState<C>;
    type Arguments = SupervisorArgs<C>;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        debug!(
            max_attempts = args.settings.max_attempts,
            retry_interval = ?args.settings.retry_interval,
            connect_timeout = ?args.settings.connect_timeout,
            "MySQL supervisor initialized"
        );
        Ok(SupervisorState {
            settings: args.settings,
            launcher: args.launcher,
            connector: args.connector,
            faults: args.faults,
            conn_tx: args.conn_tx,
            status_tx: args.status_tx,
            process: None,
            watchdog: None,
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisorMessage::Start(reply) => {
                let res = start(state).await;
                let _ = reply.send(res);
            }
            SupervisorMessage::Destroy(reply) => {
                destroy(state).await;
                let _ = reply.send(());
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        destroy(state).await;
        Ok(())
    }
}

async fn start<C: Connector>(state: &mut SupervisorState<C>) -> Result<(), SupervisorError> {
    if state.status() == SupervisorStatus::Ready {
        debug!("MySQL already running; start is a no-op");
        return Ok(());
    }

    info!("Starting MySQL server");
    state.set_status(SupervisorStatus::Starting);

    let process = match state.launcher.spawn(state.faults.clone()) {
        Ok(process) => process,
        Err(e) => {
            error!(error = %e, "Failed to launch mysqld");
            state.set_status(SupervisorStatus::Stopped);
            return Err(e);
        }
    };
    state.process = Some(process);

    let conn = match connect_with_retry(&state.settings, state.connector.clone()).await {
        Ok(conn) => conn,
        Err(e) => {
            error!(error = %e, "Failed to start mysqld");
            destroy(state).await;
            return Err(e);
        }
    };

    if let Some(process) = state.process.as_ref() {
        process.arm();
    }

    if let Err(e) = ensure_extension(&conn, &state.settings.udf_library).await {
        destroy(state).await;
        return Err(e);
    }

    if let Some(period) = state.settings.health_check_interval {
        state.watchdog = Some(spawn_watchdog(conn.clone(), period, state.faults.clone()));
    }

    state.conn_tx.send_replace(Some(conn));
    state.set_status(SupervisorStatus::Ready);
    info!("MySQL ready");
    Ok(())
}

async fn destroy<C: Connector>(state: &mut SupervisorState<C>) {
    if let Some(watchdog) = state.watchdog.take() {
        watchdog.abort();
    }
    state.conn_tx.send_replace(None);

    let Some(process) = state.process.take() else {
        debug!("No mysqld process to stop");
        return;
    };

    info!(pid = ?process.pid(), "Stopping mysqld");
    state.set_status(SupervisorStatus::Stopping);
    process.terminate(state.settings.shutdown_timeout).await;
    state.set_status(SupervisorStatus::Stopped);
}

async fn connect_with_retry<C: Connector>(
    settings: &SupervisorSettings,
    connector: Arc<C>,
) -> Result<C::Conn, SupervisorError> {
    let mut retry = ConnectRetry::new(settings.max_attempts);
    let (result_tx, mut result_rx) =
        mpsc::unbounded_channel::<(u64, u32, Result<C::Conn, SupervisorError>)>();

    let mut ticker = tokio::time::interval_at(
        Instant::now() + settings.retry_interval,
        settings.retry_interval,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => match retry.on_tick() {
                Tick::Attempt { attempt, generation } => {
                    info!(attempt, max_attempts = settings.max_attempts, "Connecting to mysqld");
                    let connector = connector.clone();
                    let result_tx = result_tx.clone();
                    let timeout = settings.connect_timeout;
                    tokio::spawn(async move {
                        let result = attempt_connect(connector.as_ref(), timeout).await;
                        // The receiver is gone once the phase has ended.
                        let _ = result_tx.send((generation, attempt, result));
                    });
                }
                Tick::Exhausted => {
                    error!(attempts = settings.max_attempts, "Giving up connecting to mysqld");
                    return Err(SupervisorError::DatabaseUnavailable {
                        attempts: settings.max_attempts,
                    });
                }
                Tick::Idle => {}
            },
            Some((generation, attempt, result)) = result_rx.recv() => {
                if !retry.is_current(generation) {
                    debug!(attempt, generation, "Ignoring superseded connection attempt");
                    continue;
                }
                match result {
                    Ok(conn) => {
                        retry.succeed(generation);
                        info!(attempt, "Connected to mysqld");
                        return Ok(conn);
                    }
                    Err(e) => {
                        warn!(
                            attempt,
                            max_attempts = settings.max_attempts,
                            retryable = e.is_retryable(),
                            error = %e,
                            "Connection attempt failed"
                        );
                    }
                }
            }
        }
    }
}

/// One connection attempt, bounded by `timeout`.
pub(crate) async fn attempt_connect<C: Connector>(
    connector: &C,
    timeout: Duration,
) -> Result<C::Conn, SupervisorError> {
    match tokio::time::timeout(timeout, connector.connect()).await {
        Ok(Ok(conn)) => Ok(conn),
        Ok(Err(e)) => Err(SupervisorError::Connect(e)),
        Err(_) => Err(SupervisorError::ConnectTimeout(timeout)),
    }
}

fn spawn_watchdog<T>(conn: T, period: Duration, faults: FaultSender) -> JoinHandle<()>
where
    T: DatabaseSession + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = conn.ping().await {
                warn!(error = %e, "MySQL connection health check failed");
                if !faults.report(Fault::Connection(e)) {
                    break;
                }
            }
        }
    })
}
