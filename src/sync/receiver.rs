use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use log::warn;

use crate::{protocol::SyncFrame, tracker::ChangeTracker, transport::PacketReceiver};

/// Spawns the singleton inbound worker: drain the endpoint, hand every
/// decoded frame to the tracker, sweep reassembly timeouts, sleep when
/// idle. Transport and decode failures are logged and the worker keeps
/// going.
pub(crate) fn spawn_receiver(
    mut receiver: Box<dyn PacketReceiver>,
    tracker: Arc<ChangeTracker>,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
) -> JoinHandle<()> {
    thread::spawn(move || {
        while running.load(Ordering::Acquire) {
            let mut received_any = false;
            loop {
                match receiver.receive() {
                    Ok(Some((_source, bytes))) => {
                        received_any = true;
                        match SyncFrame::from_bytes(bytes) {
                            Ok(frame) => tracker.handle_frame(frame),
                            Err(err) => warn!("discarding inbound datagram: {err}"),
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        warn!("{err}");
                        break;
                    }
                }
            }

            // Swept every cycle, received or not, so a stalled update
            // cannot outlive its timeout on a quiet link.
            tracker.check_update_timeouts();

            if !received_any {
                thread::sleep(poll_interval);
            }
        }
    })
}
