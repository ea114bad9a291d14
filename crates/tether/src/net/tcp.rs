use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};

use super::{Connector, ServerAddress, Transport};

const RECV_BUFFER_SIZE: usize = 16 * 1024;

#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

impl TcpConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for TcpConnector {
    fn connect(
        &mut self,
        address: &ServerAddress,
        timeout: Duration,
    ) -> io::Result<Box<dyn Transport>> {
        Ok(Box::new(TcpTransport::connect(address, timeout)?))
    }
}

/// Non-blocking TCP stream. Writes that would block are kept and flushed on
/// the next send or receive.
pub struct TcpTransport {
    stream: TcpStream,
    outbound: BytesMut,
    recv_buffer: Box<[u8; RECV_BUFFER_SIZE]>,
    open: bool,
}

impl TcpTransport {
    pub fn connect(address: &ServerAddress, timeout: Duration) -> io::Result<Self> {
        let mut last_error = None;
        for addr in (address.host.as_str(), address.port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Self::from_stream(stream),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("{address} did not resolve"),
            )
        }))
    }

    pub fn from_stream(stream: TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            outbound: BytesMut::new(),
            recv_buffer: Box::new([0u8; RECV_BUFFER_SIZE]),
            open: true,
        })
    }

    fn flush_outbound(&mut self) -> io::Result<()> {
        while !self.outbound.is_empty() {
            match self.stream.write(&self.outbound) {
                Ok(0) => {
                    self.open = false;
                    return Err(io::ErrorKind::WriteZero.into());
                }
                Ok(n) => self.outbound.advance(n),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.open = false;
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        if !self.open {
            return Err(io::ErrorKind::NotConnected.into());
        }
        self.outbound.extend_from_slice(frame);
        self.flush_outbound()
    }

    fn receive(&mut self) -> io::Result<Vec<Bytes>> {
        if !self.open {
            return Err(io::ErrorKind::NotConnected.into());
        }
        self.flush_outbound()?;

        let mut chunks = Vec::new();
        loop {
            match self.stream.read(&mut self.recv_buffer[..]) {
                Ok(0) => {
                    self.open = false;
                    if chunks.is_empty() {
                        return Err(io::ErrorKind::UnexpectedEof.into());
                    }
                    break;
                }
                Ok(n) => chunks.push(Bytes::copy_from_slice(&self.recv_buffer[..n])),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.open = false;
                    return Err(e);
                }
            }
        }
        Ok(chunks)
    }

    fn close(&mut self) {
        if self.open {
            let _ = self.flush_outbound();
            let _ = self.stream.shutdown(Shutdown::Both);
            self.open = false;
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.close();
    }
}
