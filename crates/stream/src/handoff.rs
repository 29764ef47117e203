// Copyright 2025-2026 CEMAXECUTER LLC

//! Non-blocking handoff from the hardware callback thread to a consumer thread.
//!
//! The callback side never blocks: every publish is a single `try_send` on a
//! bounded crossbeam channel and the message is dropped when the queue is full
//! or, for a zero-capacity queue, when no receiver is waiting. Every publish
//! attempt consumes a sequence number, so consumers detect drops as gaps.
//!
//! Closing only sets a latch. The producer notices it on its next publish and
//! drops the sender there, which avoids tearing the queue down underneath a
//! publish that is in flight on the callback thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam::channel::{bounded, Receiver, Sender};

use crate::error::{Error, Result};
use crate::synchro::{Frame, SynchroEvent, SynchroHandler};
use crate::{DeviceEvent, StreamParams, Tuner};

/// Producer half of a handoff channel.
pub struct Handoff<T> {
    tx: Option<Sender<T>>,
    done: Arc<AtomicBool>,
    seq: u64,
}

/// Closes a [`Handoff`] from any thread.
#[derive(Debug, Clone)]
pub struct HandoffCloser {
    done: Arc<AtomicBool>,
}

impl HandoffCloser {
    /// Stop further deliveries. The receiver observes disconnection after the
    /// producer's next publish attempt. Fails if already closed.
    pub fn close(&self) -> Result<()> {
        if self.done.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyClosed);
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

impl<T> Handoff<T> {
    /// Create a handoff channel buffering up to `capacity` messages.
    /// With `capacity == 0` a message is only delivered to a receiver that
    /// is already blocked in `recv`.
    pub fn new(capacity: usize) -> (Self, Receiver<T>) {
        let (tx, rx) = bounded(capacity);
        let handoff = Self {
            tx: Some(tx),
            done: Arc::new(AtomicBool::new(false)),
            seq: 0,
        };
        (handoff, rx)
    }

    pub fn closer(&self) -> HandoffCloser {
        HandoffCloser {
            done: self.done.clone(),
        }
    }

    /// See [`HandoffCloser::close`].
    pub fn close(&self) -> Result<()> {
        self.closer().close()
    }

    /// Sequence number the next publish attempt will use
    pub fn next_seq(&self) -> u64 {
        self.seq
    }

    /// Build a message with the next sequence number and try to enqueue it.
    /// Returns whether it was delivered; a dropped message is not an error.
    pub fn publish(&mut self, build: impl FnOnce(u64) -> T) -> bool {
        if self.done.load(Ordering::Acquire) {
            if self.tx.take().is_some() {
                log::debug!("handoff closed after {} messages", self.seq);
            }
            return false;
        }
        let Some(tx) = self.tx.as_ref() else {
            return false;
        };

        let seq = self.seq;
        self.seq += 1;
        // full, no receiver ready, or receiver gone: drop
        tx.try_send(build(seq)).is_ok()
    }
}

/// Owned copy of one stream callback
#[derive(Debug, Clone)]
pub struct StreamMsg {
    buf: Vec<i16>,
    split: usize,
    pub params: StreamParams,
    pub reset: bool,
    pub seq: u64,
}

impl StreamMsg {
    pub fn xi(&self) -> &[i16] {
        &self.buf[..self.split]
    }

    pub fn xq(&self) -> &[i16] {
        &self.buf[self.split..]
    }
}

impl Handoff<StreamMsg> {
    /// Copy a stream callback's buffers into a single allocation and hand
    /// them off. `params` is copied when present.
    pub fn publish_stream(
        &mut self,
        xi: &[i16],
        xq: &[i16],
        params: Option<&StreamParams>,
        reset: bool,
    ) -> bool {
        self.publish(|seq| {
            let mut buf = Vec::with_capacity(xi.len() + xq.len());
            buf.extend_from_slice(xi);
            buf.extend_from_slice(xq);
            StreamMsg {
                buf,
                split: xi.len(),
                params: params.copied().unwrap_or_default(),
                reset,
                seq,
            }
        })
    }
}

/// Owned copy of one synchronized frame
#[derive(Debug, Clone)]
pub struct SynchroMsg {
    buf: Vec<i16>,
    len: usize,
    pub reset: bool,
    pub seq: u64,
}

impl SynchroMsg {
    pub fn xia(&self) -> &[i16] {
        &self.buf[..self.len]
    }

    pub fn xqa(&self) -> &[i16] {
        &self.buf[self.len..2 * self.len]
    }

    pub fn xib(&self) -> &[i16] {
        &self.buf[2 * self.len..3 * self.len]
    }

    pub fn xqb(&self) -> &[i16] {
        &self.buf[3 * self.len..]
    }

    /// Samples per component
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Borrow the message as a frame, e.g. to feed the output helpers
    pub fn frame(&self) -> Frame<'_> {
        Frame::new(self.xia(), self.xqa(), self.xib(), self.xqb(), self.reset)
    }
}

impl Handoff<SynchroMsg> {
    pub fn publish_frame(&mut self, frame: &Frame<'_>) -> bool {
        self.publish(|seq| {
            let mut buf = Vec::with_capacity(4 * frame.len());
            buf.extend_from_slice(frame.xia());
            buf.extend_from_slice(frame.xqa());
            buf.extend_from_slice(frame.xib());
            buf.extend_from_slice(frame.xqb());
            SynchroMsg {
                buf,
                len: frame.len(),
                reset: frame.reset(),
                seq,
            }
        })
    }
}

/// A frame handoff can be plugged straight into a synchronizer.
impl SynchroHandler for Handoff<SynchroMsg> {
    fn on_frame(&mut self, frame: Frame<'_>) {
        self.publish_frame(&frame);
    }

    fn on_event(&mut self, event: SynchroEvent, detail: &str) {
        log::debug!("{}: {}", event, detail);
    }
}

/// Owned copy of one device event callback
#[derive(Debug, Clone, PartialEq)]
pub struct EventMsg {
    pub event: DeviceEvent,
    pub tuner: Tuner,
    pub seq: u64,
}

impl Handoff<EventMsg> {
    pub fn publish_event(&mut self, tuner: Tuner, event: DeviceEvent) -> bool {
        self.publish(|seq| EventMsg { event, tuner, seq })
    }
}
