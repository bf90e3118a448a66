// Copyright (c) 2022 MASSA LABS <info@massa.net>

use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token, Waker};
use parex_execution_exports::ExecutionError;
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpStream};
use tracing::{info, warn};

const NEW_CONNECTION: Token = Token(0);
const STOP_LISTENER: Token = Token(10);

/// Listener of the cluster coordinator: a `select!` over incoming connections and a waker
pub(crate) struct ClusterListener {
    poll: Poll,
    events: Events,
    server: TcpListener,
    std_server: std::net::TcpListener,
}

pub(crate) struct ClusterListenerStopHandle(Waker);

pub(crate) enum PollEvent {
    NewConnections(Vec<(TcpStream, SocketAddr)>),
    Stop,
}

impl ClusterListener {
    /// Setup a mio-listener on `addr`
    pub fn create(addr: &SocketAddr) -> Result<(ClusterListenerStopHandle, Self), ExecutionError> {
        let domain = if addr.is_ipv4() {
            socket2::Domain::IPV4
        } else {
            socket2::Domain::IPV6
        };

        let socket = socket2::Socket::new(domain, socket2::Type::STREAM, None)?;

        if addr.is_ipv6() {
            socket.set_only_v6(false)?;
        }
        socket.set_reuse_address(true)?;
        // the mio poll only triggers again once every pending connection was accepted,
        // which requires a non-blocking accept
        socket.set_nonblocking(true)?;
        socket.bind(&(*addr).into())?;
        socket.listen(1024)?;

        let std_server: std::net::TcpListener = socket.into();
        let mut server = TcpListener::from_std(std_server.try_clone()?);
        info!("cluster listener bound on {}", server.local_addr()?);

        let poll = Poll::new()?;

        // wake up the poll when we want to stop the listener
        let waker = ClusterListenerStopHandle(Waker::new(poll.registry(), STOP_LISTENER)?);

        poll.registry()
            .register(&mut server, NEW_CONNECTION, Interest::READABLE)?;

        let events = Events::with_capacity(128);
        Ok((
            waker,
            ClusterListener {
                poll,
                events,
                server,
                std_server,
            },
        ))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ExecutionError> {
        Ok(self.server.local_addr()?)
    }

    /// Block until connections come in or the stop handle is used.
    /// Accepted streams are blocking.
    pub fn poll(&mut self) -> Result<PollEvent, ExecutionError> {
        if let Err(err) = self.poll.poll(&mut self.events, None) {
            if err.kind() == ErrorKind::Interrupted {
                return Ok(PollEvent::NewConnections(Vec::new()));
            }
            return Err(err.into());
        }

        let mut results = Vec::new();
        for event in self.events.iter() {
            match event.token() {
                NEW_CONNECTION => loop {
                    match self.std_server.accept() {
                        Ok((stream, remote_addr)) => {
                            stream.set_nonblocking(false)?;
                            stream.set_nodelay(true)?;
                            results.push((stream, remote_addr));
                        }
                        Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                        Err(e) => {
                            warn!("error accepting a cluster connection: {:?}", e);
                            break;
                        }
                    }
                },
                STOP_LISTENER => return Ok(PollEvent::Stop),
                _ => {}
            }
        }

        Ok(PollEvent::NewConnections(results))
    }
}

impl ClusterListenerStopHandle {
    /// Stop the cluster listener.
    pub fn stop(&self) -> Result<(), ExecutionError> {
        self.0.wake().map_err(ExecutionError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_then_stops() {
        let (stop_handle, mut listener) =
            ClusterListener::create(&"127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();

        let mut accepted = Vec::new();
        while accepted.is_empty() {
            match listener.poll().unwrap() {
                PollEvent::NewConnections(connections) => accepted.extend(connections),
                PollEvent::Stop => panic!("stop requested before any connection"),
            }
        }
        assert_eq!(accepted[0].1, client.local_addr().unwrap());

        stop_handle.stop().unwrap();
        assert!(matches!(listener.poll().unwrap(), PollEvent::Stop));
    }
}
