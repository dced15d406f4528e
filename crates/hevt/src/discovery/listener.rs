// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One-shot reply listener threads.
//!
//! Each probe socket gets a dedicated thread that waits for a single
//! inbound datagram and reports it on the shared completion channel, then
//! exits. The coordinator restarts a listener after consuming its packet
//! to drain any backlog. Cancellation is cooperative: the socket carries a
//! read timeout, and the thread checks its running flag between slices.

use crate::config::MAX_REPLY_BYTES;
use crossbeam::channel::Sender;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Outcome of one listener: which socket, and either a datagram or the
/// error that ended the wait. Timeout slices are internal and never
/// reported.
pub struct ListenEvent {
    pub socket_index: usize,
    pub result: io::Result<(Vec<u8>, SocketAddr)>,
}

/// Handle to a running one-shot listener.
pub struct ReplyListener {
    handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl ReplyListener {
    /// Spawn a listener for `socket` that reports on `tx`.
    pub fn spawn(
        socket: Arc<UdpSocket>,
        socket_index: usize,
        tx: Sender<ListenEvent>,
    ) -> io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = Arc::clone(&running);

        let handle = std::thread::Builder::new()
            .name(format!("hevt-disc-rx-{}", socket_index))
            .spawn(move || {
                Self::run(&socket, socket_index, &tx, &running_clone);
            })?;

        Ok(Self {
            handle: Some(handle),
            running,
        })
    }

    fn run(
        socket: &UdpSocket,
        socket_index: usize,
        tx: &Sender<ListenEvent>,
        running: &AtomicBool,
    ) {
        let mut buf = vec![0u8; MAX_REPLY_BYTES];
        loop {
            match socket.recv_from(&mut buf) {
                Ok((len, src)) => {
                    let _ = tx.send(ListenEvent {
                        socket_index,
                        result: Ok((buf[..len].to_vec(), src)),
                    });
                    return;
                }
                Err(e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut =>
                {
                    // Read-timeout slice; keep waiting unless cancelled.
                    if !running.load(Ordering::Relaxed) {
                        return;
                    }
                }
                Err(e) => {
                    let _ = tx.send(ListenEvent {
                        socket_index,
                        result: Err(e),
                    });
                    return;
                }
            }
        }
    }

    /// Ask the thread to stop after its current slice.
    pub fn cancel(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

impl Drop for ReplyListener {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
