use std::{
    io,
    net::{SocketAddr, UdpSocket},
};

use crate::protocol::FRAME_BYTES;

use super::{PacketReceiver, PacketSender, RecvError, SendError, TransportError};

/// Connectionless datagram transport over UDP. One bound socket serves
/// both directions: the cloned send half is shared by the synchronizer
/// workers, the receive half belongs to the receiver worker.
pub struct UdpTransport;

impl UdpTransport {
    pub fn bind(
        address: SocketAddr,
    ) -> Result<(Box<dyn PacketSender>, Box<dyn PacketReceiver>), TransportError> {
        let socket = UdpSocket::bind(address).map_err(|err| bind_failed(address, err))?;
        socket
            .set_nonblocking(true)
            .map_err(|err| bind_failed(address, err))?;
        let send_socket = socket.try_clone().map_err(|err| bind_failed(address, err))?;

        let sender = UdpPacketSender {
            socket: send_socket,
        };
        let receiver = UdpPacketReceiver {
            socket,
            buffer: [0; FRAME_BYTES],
        };
        Ok((Box::new(sender), Box::new(receiver)))
    }
}

fn bind_failed(address: SocketAddr, err: io::Error) -> TransportError {
    TransportError::BindFailed {
        address: address.to_string(),
        reason: err.to_string(),
    }
}

struct UdpPacketSender {
    socket: UdpSocket,
}

impl PacketSender for UdpPacketSender {
    fn send(&self, address: &SocketAddr, payload: &[u8]) -> Result<(), SendError> {
        match self.socket.send_to(payload, address) {
            Ok(_) => Ok(()),
            Err(err) => Err(SendError {
                reason: err.to_string(),
            }),
        }
    }
}

struct UdpPacketReceiver {
    socket: UdpSocket,
    buffer: [u8; FRAME_BYTES],
}

impl PacketReceiver for UdpPacketReceiver {
    fn receive(&mut self) -> Result<Option<(SocketAddr, &[u8])>, RecvError> {
        match self.socket.recv_from(&mut self.buffer) {
            Ok((length, address)) => Ok(Some((address, &self.buffer[..length]))),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(RecvError {
                reason: err.to_string(),
            }),
        }
    }
}
