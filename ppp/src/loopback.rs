//! Two in-process links wired back to back over byte channels.

use crate::config::LinkConfig;
use crate::error::{Error, Result};
use crate::link::PppLink;
use log::{error, info};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread;
use std::time::Duration;

/// Starts configuration on both sides and waits for both to open.
///
/// Fails with [`Error::NotOpened`] when either side is still negotiating once
/// `timeout` has elapsed.
pub fn negotiate(a: &LinkConfig, b: &LinkConfig, timeout: Duration) -> Result<()> {
    let (to_b, from_a) = mpsc::sync_channel(b.event_queue_depth);
    let (to_a, from_b) = mpsc::sync_channel(a.event_queue_depth);

    let link_a = PppLink::new(a, to_b)?;
    let link_b = PppLink::new(b, to_a)?;

    let handle_a = thread::spawn(move || drive("a", link_a, from_b, timeout));
    let handle_b = thread::spawn(move || drive("b", link_b, from_a, timeout));

    let mut opened = true;
    for handle in [handle_a, handle_b] {
        match handle.join() {
            Ok(result) => opened &= result?,
            Err(_) => {
                error!("link thread panicked");
                opened = false;
            }
        }
    }

    if !opened {
        return Err(Error::NotOpened { timeout });
    }
    info!("loopback negotiation complete");
    Ok(())
}

fn drive(name: &str, mut link: PppLink<SyncSender<u8>>, rx: Receiver<u8>, timeout: Duration) -> Result<bool> {
    link.start_configuration()?;
    let opened = link.run_until(&rx, timeout, PppLink::is_opened);

    let stats = link.stats();
    info!(
        "link {name}: opened={opened}, peer magic {:#010x}, {} frames received, {} sent, {} fcs errors",
        link.lcp().peer_magic(),
        stats.frames_received,
        stats.frames_sent,
        stats.fcs_errors
    );
    Ok(opened)
}
