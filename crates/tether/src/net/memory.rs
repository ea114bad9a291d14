use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::rc::Rc;
use std::time::Duration;

use bytes::Bytes;

use super::{Connector, ServerAddress, Transport};

#[derive(Debug, Default)]
struct Pipe {
    inbound: [VecDeque<Bytes>; 2],
    open: [bool; 2],
}

/// One end of an in-process connection. Side 0 is the connecting client,
/// side 1 the accepting listener.
#[derive(Debug)]
pub struct MemoryTransport {
    pipe: Rc<RefCell<Pipe>>,
    side: usize,
}

impl MemoryTransport {
    fn pair() -> (Self, Self) {
        let pipe = Rc::new(RefCell::new(Pipe {
            inbound: [VecDeque::new(), VecDeque::new()],
            open: [true, true],
        }));
        (
            Self {
                pipe: Rc::clone(&pipe),
                side: 0,
            },
            Self { pipe, side: 1 },
        )
    }

    fn peer(&self) -> usize {
        1 - self.side
    }

    pub fn peer_open(&self) -> bool {
        self.pipe.borrow().open[self.peer()]
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        let mut pipe = self.pipe.borrow_mut();
        if !pipe.open[self.side] {
            return Err(io::ErrorKind::NotConnected.into());
        }
        let peer = self.peer();
        if !pipe.open[peer] {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        pipe.inbound[peer].push_back(Bytes::copy_from_slice(frame));
        Ok(())
    }

    fn receive(&mut self) -> io::Result<Vec<Bytes>> {
        let mut pipe = self.pipe.borrow_mut();
        if !pipe.open[self.side] {
            return Err(io::ErrorKind::NotConnected.into());
        }
        let chunks: Vec<Bytes> = pipe.inbound[self.side].drain(..).collect();
        if chunks.is_empty() && !pipe.open[self.peer()] {
            pipe.open[self.side] = false;
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        Ok(chunks)
    }

    fn close(&mut self) {
        let mut pipe = self.pipe.borrow_mut();
        pipe.open[self.side] = false;
        pipe.inbound[self.side].clear();
    }

    fn is_open(&self) -> bool {
        self.pipe.borrow().open[self.side]
    }
}

type Backlog = Rc<RefCell<VecDeque<MemoryTransport>>>;

/// In-process address space shared by connectors and listeners.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    listeners: Rc<RefCell<HashMap<ServerAddress, Backlog>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listen(&self, address: ServerAddress) -> MemoryListener {
        let backlog = Backlog::default();
        self.listeners
            .borrow_mut()
            .insert(address.clone(), Rc::clone(&backlog));
        MemoryListener {
            network: self.clone(),
            address,
            backlog,
        }
    }

    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector {
            network: self.clone(),
        }
    }
}

#[derive(Debug)]
pub struct MemoryListener {
    network: MemoryNetwork,
    address: ServerAddress,
    backlog: Backlog,
}

impl MemoryListener {
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    pub fn accept(&self) -> Option<MemoryTransport> {
        self.backlog.borrow_mut().pop_front()
    }

    /// Stops accepting; later connects are refused.
    pub fn shutdown(&self) {
        let mut listeners = self.network.listeners.borrow_mut();
        if listeners
            .get(&self.address)
            .is_some_and(|backlog| Rc::ptr_eq(backlog, &self.backlog))
        {
            listeners.remove(&self.address);
        }
    }
}

impl Drop for MemoryListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[derive(Debug, Clone)]
pub struct MemoryConnector {
    network: MemoryNetwork,
}

impl Connector for MemoryConnector {
    fn connect(
        &mut self,
        address: &ServerAddress,
        _timeout: Duration,
    ) -> io::Result<Box<dyn Transport>> {
        let listeners = self.network.listeners.borrow();
        let backlog = listeners.get(address).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("nothing listening on {address}"),
            )
        })?;
        let (client, server) = MemoryTransport::pair();
        backlog.borrow_mut().push_back(server);
        Ok(Box::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_and_exchange() {
        let network = MemoryNetwork::new();
        let listener = network.listen(ServerAddress::new("auth", 1));
        let mut client = network
            .connector()
            .connect(&ServerAddress::new("auth", 1), Duration::ZERO)
            .unwrap();
        let mut server = listener.accept().unwrap();

        client.send(&[1, 2]).unwrap();
        client.send(&[3]).unwrap();
        let chunks = server.receive().unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(&chunks[1][..], &[3]);

        server.send(&[7]).unwrap();
        assert_eq!(&client.receive().unwrap()[0][..], &[7]);
        assert!(client.receive().unwrap().is_empty());
    }

    #[test]
    fn refused_without_listener() {
        let network = MemoryNetwork::new();
        let err = network
            .connector()
            .connect(&ServerAddress::new("nowhere", 1), Duration::ZERO)
            .err()
            .unwrap();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
    }

    #[test]
    fn peer_close_surfaces_as_eof() {
        let network = MemoryNetwork::new();
        let listener = network.listen(ServerAddress::new("base", 2));
        let mut client = network
            .connector()
            .connect(&ServerAddress::new("base", 2), Duration::ZERO)
            .unwrap();
        let mut server = listener.accept().unwrap();

        server.send(&[5]).unwrap();
        server.close();
        // data sent before the close is still delivered
        assert_eq!(client.receive().unwrap().len(), 1);
        assert_eq!(
            client.receive().unwrap_err().kind(),
            io::ErrorKind::UnexpectedEof
        );
        assert!(!client.is_open());
        assert!(client.send(&[1]).is_err());
    }
}
