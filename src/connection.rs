use std::future::Future;
use std::sync::atomic::{AtomicU16, Ordering};

use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::codec::Framed;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, info, trace, warn};

use crate::access::Transport;
use crate::modbus::{Operation, Request, Response, ResponseKind, TcpCodec};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("lookup of `{1}` failed")]
    LookupHost(#[source] std::io::Error, String),
    #[error("could not connect to `{1}` over TCP")]
    Connect(#[source] std::io::Error, String),
    #[error("the connection worker is gone")]
    WorkerGone,
    #[error("could not send out the request")]
    Send(#[source] std::io::Error),
    #[error("sending the request took too long")]
    SendTimeout,
    #[error("could not read data from the stream")]
    Receive(#[source] std::io::Error),
    #[error("the controller closed the connection")]
    Closed,
    #[error("no response to transaction {0} arrived in time")]
    Timeout(u16),
    #[error("the controller was still busy after {0} attempts")]
    Busy(usize),
}

impl Error {
    /// Whether sending the request again has a chance of succeeding.
    fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Send(_) | Error::SendTimeout | Error::Receive(_) | Error::Closed | Error::Timeout(_)
        )
    }
}

#[derive(clap::Parser, Clone, Debug)]
#[group(id = "connection::Args")]
pub struct Args {
    /// Host name or IP address of the controller's Modbus TCP interface.
    #[arg(long)]
    host: String,

    #[arg(long, default_value = "502")]
    port: u16,

    /// The modbus unit ID of the controller.
    #[arg(long, short = 'i', default_value = "1")]
    unit_id: u8,

    /// If the modbus response isn't received in this amount of time, consider the request
    /// failed.
    #[arg(long, default_value = "1s")]
    read_timeout: humantime::Duration,

    /// Reconnect, if the modbus request can't be sent in this amount of time.
    #[arg(long, default_value = "3s")]
    send_timeout: humantime::Duration,

    /// Reconnect to the controller after the specified number of consecutive read timeouts.
    #[arg(long, default_value = "3")]
    reconnect_after_timeouts: usize,

    /// The amount of time to wait between receiving a response and sending the next request.
    ///
    /// Interacting too fast can make some Modbus TCP interfaces behave poorly.
    #[arg(long, default_value = "20ms")]
    tcp_send_delay: humantime::Duration,

    /// The amount of additional time to wait after receiving a server busy exception.
    #[arg(long, default_value = "25ms")]
    server_busy_retry_delay: humantime::Duration,

    /// How many times a request is sent before giving up on timeouts or busy responses.
    #[arg(long, default_value = "3", value_parser = clap::value_parser!(u16).range(1..))]
    attempts: u16,
}

struct Job {
    request: Request,
    reply: oneshot::Sender<Result<Response, Error>>,
}

/// A Modbus TCP connection to the controller, served by a background task.
///
/// The task connects lazily and reconnects after IO errors or repeated timeouts. Requests are
/// handled one at a time, so multi-register updates issued from a single caller are never
/// interleaved with each other.
pub struct Connection {
    jobs: UnboundedSender<Job>,
    _worker: AbortOnDropHandle<()>,
    transaction_id_generator: AtomicU16,
    args: Args,
}

impl Connection {
    /// Must be called from within a tokio runtime.
    pub fn new(args: Args) -> Connection {
        let (jobs, queue) = mpsc::unbounded_channel();
        let worker = Worker {
            reconnect_countdown: args.reconnect_after_timeouts,
            args: args.clone(),
            io: None,
            next_send: Instant::now(),
        };
        let worker = AbortOnDropHandle::new(tokio::task::spawn(worker.main_loop(queue)));
        Self { jobs, _worker: worker, transaction_id_generator: AtomicU16::new(0), args }
    }

    pub fn new_transaction_id(&self) -> u16 {
        self.transaction_id_generator.fetch_add(1, Ordering::Relaxed)
    }

    async fn send_once(&self, operation: Operation) -> Result<Response, Error> {
        let transaction_id = self.new_transaction_id();
        let request = Request { unit_id: self.args.unit_id, transaction_id, operation };
        let (reply, response) = oneshot::channel();
        self.jobs.send(Job { request, reply }).map_err(|_| Error::WorkerGone)?;
        response.await.map_err(|_| Error::WorkerGone)?
    }

    /// Sends `operation`, retrying timeouts, connection trouble and `Server Busy` exceptions up
    /// to the configured number of attempts.
    pub async fn send(&self, operation: Operation) -> Result<Response, Error> {
        let attempts = usize::from(self.args.attempts);
        let mut attempt = 1;
        loop {
            match self.send_once(operation.clone()).await {
                Ok(response) if response.is_server_busy() => {
                    if attempt >= attempts {
                        return Err(Error::Busy(attempt));
                    }
                    debug!(message = "server busy, retrying", %operation, attempt);
                    tokio::time::sleep(*self.args.server_busy_retry_delay).await;
                }
                Ok(response) => return Ok(response),
                Err(error) if error.is_transient() && attempt < attempts => {
                    warn!(
                        message = "request failed, retrying",
                        %operation,
                        attempt,
                        error = (&error as &dyn std::error::Error)
                    );
                }
                Err(error) => return Err(error),
            }
            attempt += 1;
        }
    }
}

impl Transport for Connection {
    type Error = Error;

    fn execute(
        &self,
        operation: Operation,
    ) -> impl Future<Output = Result<ResponseKind, Self::Error>> + Send {
        async move { Ok(self.send(operation).await?.kind) }
    }
}

type TcpIo = Framed<TcpStream, TcpCodec>;

struct Worker {
    args: Args,
    io: Option<TcpIo>,
    /// Earliest instant at which the next request may go out.
    next_send: Instant,
    reconnect_countdown: usize,
}

impl Worker {
    async fn main_loop(mut self, mut jobs: UnboundedReceiver<Job>) {
        while let Some(Job { request, reply }) = jobs.recv().await {
            let result = self.exchange(&request).await;
            if let Err(error) = &result {
                debug!(
                    message = "request failed",
                    transaction = request.transaction_id,
                    error = (error as &dyn std::error::Error)
                );
            }
            // The caller may have given up waiting already.
            let _ = reply.send(result);
        }
        debug!("all connection handles dropped, worker exiting");
    }

    async fn exchange(&mut self, request: &Request) -> Result<Response, Error> {
        tokio::time::sleep_until(self.next_send).await;
        let mut io = match self.io.take() {
            Some(io) => io,
            None => self.connect().await?,
        };
        trace!(message = "sending", transaction = request.transaction_id, operation = %request.operation);
        match tokio::time::timeout(*self.args.send_timeout, io.send(request)).await {
            Err(_) => {
                warn!("sending a request timed out, will reconnect");
                return Err(Error::SendTimeout);
            }
            Ok(Err(e)) => return Err(Error::Send(e)),
            Ok(Ok(())) => {}
        }
        let deadline = Instant::now() + *self.args.read_timeout;
        loop {
            let next = tokio::time::timeout_at(deadline, io.next()).await;
            let response = match next {
                Err(_) => return Err(self.handle_timeout(io, request.transaction_id)),
                Ok(None) => return Err(Error::Closed),
                Ok(Some(Err(e))) => return Err(Error::Receive(e)),
                Ok(Some(Ok(response))) => response,
            };
            if response.transaction_id != request.transaction_id {
                debug!(
                    message = "a response we were not expecting",
                    transaction = response.transaction_id,
                    expected = request.transaction_id
                );
                continue;
            }
            trace!(message = "decoded a response", transaction = response.transaction_id);
            self.reconnect_countdown = self.args.reconnect_after_timeouts;
            self.next_send = Instant::now() + *self.args.tcp_send_delay;
            self.io = Some(io);
            return Ok(response);
        }
    }

    /// Keeps the connection for the next request unless too many requests have timed out in a
    /// row.
    fn handle_timeout(&mut self, io: TcpIo, transaction_id: u16) -> Error {
        debug!(
            message = "request timed out",
            transaction_id,
            reconnect_countdown = self.reconnect_countdown
        );
        match self.reconnect_countdown.checked_sub(1) {
            Some(count) => {
                self.reconnect_countdown = count;
                self.io = Some(io);
            }
            None => warn!("too many requests timed out, will reconnect"),
        }
        Error::Timeout(transaction_id)
    }

    async fn connect(&mut self) -> Result<TcpIo, Error> {
        let host = &self.args.host;
        info!(message = "connecting...", host, port = self.args.port);
        let addresses = tokio::net::lookup_host((host.as_str(), self.args.port))
            .await
            .map_err(|e| Error::LookupHost(e, host.clone()))?
            .collect::<Vec<_>>();
        debug!(message = "resolved", ?addresses);
        let socket =
            TcpStream::connect(&*addresses).await.map_err(|e| Error::Connect(e, host.clone()))?;
        let nodelay_result = socket.set_nodelay(true);
        trace!(message = "setting nodelay", is_error = ?nodelay_result.err());
        info!(message = "connected");
        self.reconnect_countdown = self.args.reconnect_after_timeouts;
        Ok(Framed::new(socket, TcpCodec::default()))
    }
}
