//! Workers, which each sit in a loop reading queries from one transport,
//! answering them, and sending the answers back.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use log::*;
use parking_lot::Mutex;

use dns::{Message, Question, ResourceRecord, ErrorCode, QClass, peek_transaction_id};
use dns::record::RecordType;
use dns_transport::{Transport, TransportError};

use crate::resolve::{Resolver, ResolutionError};


/// The transaction ID given to error responses for messages too short to
/// have had one of their own.
pub const SENTINEL_TRANSACTION_ID: u16 = 0;

/// Every address handed out says it should not be cached, as the hosts file
/// could change at any moment.
pub const ANSWER_TTL: u32 = 0;

/// Worker IDs count up across the whole process, so they are unique even
/// between servers.
static NEXT_WORKER_ID: AtomicUsize = AtomicUsize::new(1);


/// Where a worker is in its lifetime.
#[derive(PartialEq, Debug, Copy, Clone)]
pub enum WorkerState {

    /// Created, but not yet running.
    Idle,

    /// Running, with its transport set up, about to start serving.
    Ready,

    /// In the loop, reading and answering queries.
    Serving,

    /// Out of the loop for good.
    Stopped,
}


/// A **worker** owns one transport, shares the resolver with every other
/// worker, and answers queries until it gets told to stop.
pub struct Worker {
    id: usize,
    transport: Box<dyn Transport + Send>,
    resolver: Arc<Mutex<Resolver>>,
    stop: Arc<AtomicBool>,
    state: WorkerState,
}

impl Worker {

    /// Creates a new worker that serves over the given transport until the
    /// stop flag gets set.
    pub fn new(transport: Box<dyn Transport + Send>, resolver: Arc<Mutex<Resolver>>, stop: Arc<AtomicBool>) -> Self {
        let id = NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed);
        debug!("Creating {} worker #{}", transport.name(), id);
        Self { id, transport, resolver, stop, state: WorkerState::Idle }
    }

    /// This worker’s process-wide ID.
    pub fn id(&self) -> usize {
        self.id
    }

    /// The name of the transport this worker serves over.
    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Where this worker is in its lifetime.
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Serves queries until the stop flag is set. The flag is only checked
    /// between queries, so a worker blocked waiting for one will not notice
    /// it until something arrives.
    pub fn run(&mut self) {
        let mut buf = vec![0; self.transport.buffer_size()];
        let mut failures = Failures::default();

        while self.state == WorkerState::Idle && ! self.stop.load(Ordering::SeqCst) {
            match self.prepare() {
                Ok(())  => failures.reset(self.id),
                Err(e)  => failures.record(self.id, &e),
            }
        }

        self.state = WorkerState::Serving;
        while ! self.stop.load(Ordering::SeqCst) {
            match self.serve_one(&mut buf) {
                Ok(()) => {
                    failures.reset(self.id);
                }
                Err(e @ TransportError::NetworkError(_)) => {
                    failures.record(self.id, &e);
                }
                Err(e @ TransportError::MessageTooLong(_)) => {
                    warn!("Worker #{}: {}", self.id, e);
                }
                Err(e) => {
                    debug!("Worker #{}: {}", self.id, e);
                }
            }
        }

        self.state = WorkerState::Stopped;
        info!("Worker #{} stopped", self.id);
    }

    /// Sets up the transport, which for TCP means accepting the first
    /// connection, and marks the worker as ready once that succeeds.
    pub fn prepare(&mut self) -> Result<(), TransportError> {
        self.transport.setup()?;
        self.state = WorkerState::Ready;
        info!("Worker #{} ready to serve over {}", self.id, self.transport.name());
        Ok(())
    }

    /// Reads one query, and sends back a response to it.
    fn serve_one(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        self.transport.setup()?;

        let len = match self.transport.read_query(buf)? {
            0    => return Err(TransportError::EmptyRead),
            len  => len,
        };

        if self.stop.load(Ordering::SeqCst) {
            debug!("Worker #{} stopping, so not answering", self.id);
            return Ok(());
        }

        if let Some(response) = self.respond(&buf[.. len]) {
            self.transport.send_response(&response)?;
        }

        Ok(())
    }

    /// Works out the bytes to send back in response to the given query
    /// bytes. Every query gets a response, even ones that could not be
    /// read; the only time this returns `None` is when not even an error
    /// response could be built.
    pub fn respond(&self, bytes: &[u8]) -> Option<Vec<u8>> {
        let response = match Message::from_bytes(bytes) {
            Ok(query) => {
                debug!("Worker #{} got query -> {:?}", self.id, query);
                self.answer(&query)
            }
            Err(e) => {
                let transaction_id = peek_transaction_id(bytes).unwrap_or(SENTINEL_TRANSACTION_ID);
                warn!("Worker #{} could not read query {:#06x}: {}", self.id, transaction_id, e);
                Message::error_response(transaction_id, e.error_code())
            }
        };

        match response.to_bytes() {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                error!("Worker #{} could not build response: {}", self.id, e);

                let failure = Message::error_response(response.transaction_id, ErrorCode::ServerFailure);
                match failure.to_bytes() {
                    Ok(bytes) => Some(bytes),
                    Err(e) => {
                        error!("Worker #{} could not build failure response either: {}", self.id, e);
                        None
                    }
                }
            }
        }
    }

    /// Builds the response to a query by resolving each of its questions.
    fn answer(&self, query: &Message) -> Message {
        let mut answers = Vec::new();
        let mut directory_failed = false;

        for question in &query.questions {
            if ! is_address_question(question) {
                debug!("Not answering {:?} question for {:?}", question.qtype, question.qname);
                continue;
            }

            let result = self.resolver.lock().resolve(&question.qname);
            match result {
                Ok(addresses) => {
                    answers.extend(addresses.into_iter().map(|address| {
                        ResourceRecord::address(question.qname.clone(), address, ANSWER_TTL)
                    }));
                }
                Err(ResolutionError::NotFound(name)) => {
                    debug!("No addresses for {:?}", name);
                }
                Err(e) => {
                    error!("Worker #{}: {}", self.id, e);
                    directory_failed = true;
                }
            }
        }

        if ! answers.is_empty() {
            info!("Answering query {:#06x} with {} records", query.transaction_id, answers.len());
            Message::response(query, answers)
        }
        else if directory_failed {
            Message::error_response(query.transaction_id, ErrorCode::ServerFailure)
        }
        else {
            info!("Nothing found for query {:#06x}", query.transaction_id);
            Message::error_response(query.transaction_id, ErrorCode::NameError)
        }
    }
}


/// The shortest and longest a worker waits before trying again after its
/// transport fails outright, such as when the process is out of file
/// descriptors and nothing can be accepted.
const MIN_BACKOFF: Duration = Duration::from_millis(10);
const MAX_BACKOFF: Duration = Duration::from_millis(500);

/// A count of the transport failures in a row, so a failing worker backs off
/// and only warns about the first of them.
#[derive(Debug, Default)]
struct Failures {
    in_a_row: u32,
}

impl Failures {
    fn record(&mut self, worker_id: usize, error: &TransportError) {
        self.in_a_row = self.in_a_row.saturating_add(1);
        if self.in_a_row == 1 {
            warn!("Worker #{}: {}", worker_id, error);
        }
        else {
            debug!("Worker #{}: {} ({} failures in a row)", worker_id, error, self.in_a_row);
        }

        thread::sleep(backoff(self.in_a_row));
    }

    fn reset(&mut self, worker_id: usize) {
        if self.in_a_row > 1 {
            info!("Worker #{} recovered after {} failures", worker_id, self.in_a_row);
        }

        self.in_a_row = 0;
    }
}

/// How long to wait after this many failures in a row.
fn backoff(in_a_row: u32) -> Duration {
    let doublings = in_a_row.saturating_sub(1).min(16);
    MIN_BACKOFF.saturating_mul(1 << doublings).min(MAX_BACKOFF)
}


/// Whether this is a question that the hosts file can answer.
fn is_address_question(question: &Question) -> bool {
    question.qclass == QClass::IN && question.qtype == RecordType::A
}
