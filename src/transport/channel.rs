use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        mpsc::{channel, Receiver, Sender, TryRecvError},
        Arc, Mutex,
    },
};

use super::{PacketReceiver, PacketSender, RecvError, SendError};

type Routes = Arc<Mutex<HashMap<SocketAddr, Sender<(SocketAddr, Box<[u8]>)>>>>;

/// In-memory addressed datagram transport. Each endpoint gets a
/// mailbox keyed by its address; sending routes the payload to the
/// destination's mailbox. Stands in for the UDP transport in tests and
/// single-process topologies.
pub struct PacketHub {
    routes: Routes,
}

impl PacketHub {
    pub fn new() -> Self {
        Self {
            routes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Registers `address` and returns its transport pair.
    pub fn endpoint(
        &self,
        address: SocketAddr,
    ) -> (Box<dyn PacketSender>, Box<dyn PacketReceiver>) {
        let (mailbox_sender, mailbox) = channel();
        if let Ok(mut routes) = self.routes.lock() {
            routes.insert(address, mailbox_sender);
        }
        let sender = HubPacketSender {
            source: address,
            routes: self.routes.clone(),
        };
        let receiver = HubPacketReceiver {
            mailbox,
            current_payload: None,
        };
        (Box::new(sender), Box::new(receiver))
    }
}

impl Default for PacketHub {
    fn default() -> Self {
        Self::new()
    }
}

struct HubPacketSender {
    source: SocketAddr,
    routes: Routes,
}

impl PacketSender for HubPacketSender {
    fn send(&self, address: &SocketAddr, payload: &[u8]) -> Result<(), SendError> {
        let Ok(routes) = self.routes.lock() else {
            return Err(SendError {
                reason: "route table poisoned".to_string(),
            });
        };
        let Some(mailbox) = routes.get(address) else {
            return Err(SendError {
                reason: format!("no endpoint registered at {address}"),
            });
        };
        mailbox
            .send((self.source, payload.into()))
            .map_err(|_| SendError {
                reason: format!("endpoint {address} is gone"),
            })
    }
}

struct HubPacketReceiver {
    mailbox: Receiver<(SocketAddr, Box<[u8]>)>,
    current_payload: Option<Box<[u8]>>,
}

impl PacketReceiver for HubPacketReceiver {
    fn receive(&mut self) -> Result<Option<(SocketAddr, &[u8])>, RecvError> {
        match self.mailbox.try_recv() {
            Ok((address, payload)) => {
                let payload: &[u8] = self.current_payload.insert(payload);
                Ok(Some((address, payload)))
            }
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(RecvError {
                reason: "transport hub is gone".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().expect("valid address")
    }

    #[test]
    fn payloads_route_by_destination_address() {
        let hub = PacketHub::new();
        let (sender_a, _recv_a) = hub.endpoint(addr(9000));
        let (_sender_b, mut recv_b) = hub.endpoint(addr(9001));

        sender_a.send(&addr(9001), &[1, 2, 3]).expect("routed");

        let (source, payload) = recv_b.receive().expect("no error").expect("delivered");
        assert_eq!(source, addr(9000));
        assert_eq!(payload, &[1, 2, 3]);
        assert!(recv_b.receive().expect("no error").is_none());
    }

    #[test]
    fn sending_to_an_unregistered_address_fails() {
        let hub = PacketHub::new();
        let (sender, _receiver) = hub.endpoint(addr(9000));
        assert!(sender.send(&addr(9999), &[0]).is_err());
    }
}
