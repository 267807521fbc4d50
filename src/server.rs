//! Binding the sockets, running the workers, and stopping them again.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::*;
use parking_lot::Mutex;

use dns_transport::{UdpTransport, TcpTransport, TransportError};

use crate::resolve::Resolver;
use crate::worker::Worker;


/// How many of each kind of worker to run, and where.
#[derive(PartialEq, Debug, Copy, Clone)]
pub struct ServerConfig {

    /// The port to receive UDP queries on.
    pub udp_port: u16,

    /// The port to accept TCP connections on.
    pub tcp_port: u16,

    /// The number of workers serving UDP. With none, no UDP socket is bound.
    pub udp_workers: usize,

    /// The number of workers serving TCP. With none, no TCP socket is bound.
    pub tcp_workers: usize,

    /// How long a TCP connection may go without sending a query before it
    /// gets dropped. Zero means never.
    pub tcp_timeout: Duration,
}


/// A **server** that has bound its sockets and created its workers, but not
/// yet started any of them.
pub struct Server {
    udp_socket: Option<Arc<UdpSocket>>,
    tcp_listener: Option<Arc<TcpListener>>,
    stop: Arc<AtomicBool>,
    workers: Vec<Worker>,
}

impl Server {

    /// Binds the sockets that the config asks for, and creates every worker,
    /// all sharing the one resolver.
    pub fn bind(config: &ServerConfig, resolver: Resolver) -> Result<Self, TransportError> {
        let resolver = Arc::new(Mutex::new(resolver));
        let stop = Arc::new(AtomicBool::new(false));
        let mut workers = Vec::with_capacity(config.udp_workers + config.tcp_workers);

        let udp_socket = if config.udp_workers > 0 {
            let socket = UdpTransport::bind(config.udp_port)?;
            for _ in 0 .. config.udp_workers {
                let transport = UdpTransport::new(Arc::clone(&socket));
                workers.push(Worker::new(Box::new(transport), Arc::clone(&resolver), Arc::clone(&stop)));
            }
            Some(socket)
        }
        else {
            debug!("No UDP workers, so not binding a UDP socket");
            None
        };

        let tcp_listener = if config.tcp_workers > 0 {
            let listener = TcpTransport::listen(config.tcp_port)?;
            let accept_lock = Arc::new(Mutex::new(()));
            for _ in 0 .. config.tcp_workers {
                let transport = TcpTransport::new(Arc::clone(&listener), Arc::clone(&accept_lock), config.tcp_timeout);
                workers.push(Worker::new(Box::new(transport), Arc::clone(&resolver), Arc::clone(&stop)));
            }
            Some(listener)
        }
        else {
            debug!("No TCP workers, so not listening for TCP connections");
            None
        };

        Ok(Self { udp_socket, tcp_listener, stop, workers })
    }

    /// The address the UDP socket ended up bound to, if there is one.
    pub fn udp_local_addr(&self) -> Option<SocketAddr> {
        self.udp_socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// The address the TCP socket ended up listening on, if there is one.
    pub fn tcp_local_addr(&self) -> Option<SocketAddr> {
        self.tcp_listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Starts every worker in a thread of its own.
    pub fn start(self) -> io::Result<RunningServer> {
        let Self { udp_socket, tcp_listener, stop, workers } = self;

        let mut running = RunningServer {
            udp_socket,
            tcp_listener,
            udp_workers: 0,
            tcp_workers: 0,
            stop,
            threads: Vec::with_capacity(workers.len()),
        };

        for mut worker in workers {
            let transport_name = worker.transport_name();
            let thread_name = format!("{}-worker-{}", transport_name.to_lowercase(), worker.id());

            match thread::Builder::new().name(thread_name).spawn(move || {
                worker.run();
                debug!("Worker #{} finished in state {:?}", worker.id(), worker.state());
            }) {
                Ok(handle) => {
                    match transport_name {
                        "UDP"  => running.udp_workers += 1,
                        _      => running.tcp_workers += 1,
                    }
                    running.threads.push(handle);
                }
                Err(e) => {
                    error!("Failed to start worker thread: {}", e);
                    running.shutdown();
                    return Err(e);
                }
            }
        }

        info!("Started {} UDP and {} TCP workers", running.udp_workers, running.tcp_workers);
        Ok(running)
    }

    /// Starts the server, blocks until the stop condition returns, then
    /// shuts the server down.
    pub fn serve_until(self, stop_condition: impl FnOnce()) -> io::Result<()> {
        let running = self.start()?;
        stop_condition();
        info!("Stop condition reached");
        running.shutdown();
        Ok(())
    }
}


/// A server whose workers are all running in their own threads.
pub struct RunningServer {
    udp_socket: Option<Arc<UdpSocket>>,
    tcp_listener: Option<Arc<TcpListener>>,
    udp_workers: usize,
    tcp_workers: usize,
    stop: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl RunningServer {

    /// Tells every worker to stop, waits for them all to do so, and then
    /// closes the sockets.
    ///
    /// A TCP worker that is in the middle of a connection only notices once
    /// its client sends something, hangs up, or goes quiet for longer than
    /// the idle timeout, so this can take up to that long.
    pub fn shutdown(self) {
        info!("Shutting down");
        self.stop.store(true, Ordering::SeqCst);
        self.wake_workers();

        for handle in self.threads {
            let name = handle.thread().name().unwrap_or("worker").to_owned();
            if handle.join().is_err() {
                error!("Thread {} panicked", name);
            }
            else {
                debug!("Joined thread {}", name);
            }
        }

        drop(self.udp_socket);
        drop(self.tcp_listener);
        info!("All workers stopped");
    }

    /// Gets every worker that is blocked waiting for a query or a
    /// connection to come out of it, so it can see the stop flag: an empty
    /// datagram for each UDP worker, and a connection that gets closed
    /// straight away for each TCP worker.
    fn wake_workers(&self) {
        if let Some(port) = self.udp_socket.as_ref().and_then(|s| s.local_addr().ok()).map(|a| a.port()) {
            match UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)) {
                Ok(waker) => {
                    for _ in 0 .. self.udp_workers {
                        if let Err(e) = waker.send_to(&[], (Ipv4Addr::LOCALHOST, port)) {
                            warn!("Failed to wake UDP worker: {}", e);
                        }
                    }
                }
                Err(e) => {
                    warn!("Failed to bind socket to wake UDP workers: {}", e);
                }
            }
        }

        if let Some(port) = self.tcp_listener.as_ref().and_then(|l| l.local_addr().ok()).map(|a| a.port()) {
            for _ in 0 .. self.tcp_workers {
                if let Err(e) = TcpStream::connect((Ipv4Addr::LOCALHOST, port)) {
                    warn!("Failed to wake TCP worker: {}", e);
                }
            }
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    use std::io::{Cursor, Read, Write};
    use std::net::Shutdown;
    use std::num::NonZeroUsize;

    use dns::{Message, Flags, Question, QClass, ResourceRecord, ErrorCode};
    use dns::record::RecordType;
    use crate::cache::NameCache;

    const HOSTS: &str = "\
        127.0.0.1 localhost\n\
        10.0.0.1 host1 host1.alias\n\
        10.0.0.2 host2\n";

    fn resolver() -> Resolver {
        let cache = NameCache::new(NonZeroUsize::new(16).unwrap(), NonZeroUsize::new(4).unwrap());
        Resolver::new(Cursor::new(HOSTS.as_bytes().to_vec()), cache, NonZeroUsize::new(8).unwrap())
    }

    fn config(udp_workers: usize, tcp_workers: usize) -> ServerConfig {
        ServerConfig {
            udp_port: 0,
            tcp_port: 0,
            udp_workers,
            tcp_workers,
            tcp_timeout: Duration::from_secs(2),
        }
    }

    fn query(transaction_id: u16, name: &str) -> Vec<u8> {
        let query = Message {
            transaction_id,
            flags: Flags::query(),
            questions: vec![ Question { qname: name.into(), qtype: RecordType::A, qclass: QClass::IN } ],
            answers: Vec::new(),
        };

        query.to_bytes().unwrap()
    }

    fn read_framed(stream: &mut TcpStream) -> Message {
        let mut len_bytes = [0; 2];
        stream.read_exact(&mut len_bytes).unwrap();

        let mut bytes = vec![0; usize::from(u16::from_be_bytes(len_bytes))];
        stream.read_exact(&mut bytes).unwrap();
        Message::from_response_bytes(&bytes).unwrap()
    }

    #[test]
    fn sockets_only_for_workers() {
        let server = Server::bind(&config(0, 0), resolver()).unwrap();
        assert_eq!(server.udp_local_addr(), None);
        assert_eq!(server.tcp_local_addr(), None);

        let server = Server::bind(&config(1, 1), resolver()).unwrap();
        assert!(server.udp_local_addr().is_some());
        assert!(server.tcp_local_addr().is_some());
    }

    #[test]
    fn answers_over_udp() {
        let server = Server::bind(&config(2, 0), resolver()).unwrap();
        let port = server.udp_local_addr().unwrap().port();
        let running = server.start().unwrap();

        let client = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

        client.send_to(&query(0x0a0a, "host1.alias"), (Ipv4Addr::LOCALHOST, port)).unwrap();
        let mut buf = [0; 512];
        let (len, _) = client.recv_from(&mut buf).unwrap();
        let response = Message::from_response_bytes(&buf[.. len]).unwrap();

        assert_eq!(response.transaction_id, 0x0a0a);
        assert_eq!(response.answers, vec![
            ResourceRecord::address("host1.alias", Ipv4Addr::new(10, 0, 0, 1), 0),
        ]);

        client.send_to(&query(0x0b0b, "nowhere"), (Ipv4Addr::LOCALHOST, port)).unwrap();
        let (len, _) = client.recv_from(&mut buf).unwrap();
        let response = Message::from_response_bytes(&buf[.. len]).unwrap();

        assert_eq!(response.transaction_id, 0x0b0b);
        assert_eq!(response.flags.error_code, Some(ErrorCode::NameError));

        running.shutdown();
    }

    #[test]
    fn answers_garbage_over_udp() {
        let server = Server::bind(&config(1, 0), resolver()).unwrap();
        let port = server.udp_local_addr().unwrap().port();
        let running = server.start().unwrap();

        let client = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        client.send_to(&[ 0x99, 0x88, 0x77 ], (Ipv4Addr::LOCALHOST, port)).unwrap();

        let mut buf = [0; 512];
        let (len, _) = client.recv_from(&mut buf).unwrap();
        let response = Message::from_response_bytes(&buf[.. len]).unwrap();

        assert_eq!(response.transaction_id, 0x9988);
        assert_eq!(response.flags.error_code, Some(ErrorCode::FormatError));

        running.shutdown();
    }

    /// Has each client send several queries over one connection, then
    /// checks that nothing more than the answers came back once the client
    /// has finished writing.
    fn run_tcp_clients(workers: usize, clients: u16, rounds: u16) {
        let server = Server::bind(&config(0, workers), resolver()).unwrap();
        let port = server.tcp_local_addr().unwrap().port();
        let running = server.start().unwrap();

        let clients = (0 .. clients).map(|client_number| {
            thread::spawn(move || {
                let mut stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).unwrap();
                stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

                for round in 0 .. rounds {
                    let transaction_id = client_number * 0x100 + round;
                    let name = if round % 2 == 0 { "host1" } else { "host2" };

                    let bytes = query(transaction_id, name);
                    let mut framed = (bytes.len() as u16).to_be_bytes().to_vec();
                    framed.extend_from_slice(&bytes);
                    stream.write_all(&framed).unwrap();

                    let response = read_framed(&mut stream);
                    assert_eq!(response.transaction_id, transaction_id);
                    assert_eq!(response.answers.len(), 1);
                    assert_eq!(response.answers[0].name, name);
                }

                stream.shutdown(Shutdown::Write).unwrap();
                let mut leftover = Vec::new();
                stream.read_to_end(&mut leftover).unwrap();
                assert_eq!(leftover, Vec::<u8>::new());
            })
        }).collect::<Vec<_>>();

        for client in clients {
            client.join().unwrap();
        }

        running.shutdown();
    }

    #[test]
    fn concurrent_tcp_connections() {
        for _ in 0 .. 3 {
            run_tcp_clients(4, 4, 5);
        }
    }

    #[test]
    fn more_tcp_clients_than_workers() {
        run_tcp_clients(2, 6, 5);
    }

    #[test]
    fn shutdown_releases_sockets() {
        let server = Server::bind(&config(2, 3), resolver()).unwrap();
        let udp_port = server.udp_local_addr().unwrap().port();
        let running = server.start().unwrap();

        running.shutdown();

        UdpSocket::bind((Ipv4Addr::UNSPECIFIED, udp_port)).unwrap();
    }

    #[test]
    fn serve_until_stops() {
        let server = Server::bind(&config(1, 1), resolver()).unwrap();
        let port = server.udp_local_addr().unwrap().port();

        server.serve_until(|| {
            let client = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
            client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
            client.send_to(&query(0x0c0c, "localhost"), (Ipv4Addr::LOCALHOST, port)).unwrap();

            let mut buf = [0; 512];
            let (len, _) = client.recv_from(&mut buf).unwrap();
            let response = Message::from_response_bytes(&buf[.. len]).unwrap();
            assert_eq!(response.answers.len(), 1);
        }).unwrap();
    }
}
