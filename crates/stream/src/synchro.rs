// Copyright 2025-2026 CEMAXECUTER LLC

//! Dual-tuner sample synchronizer.
//!
//! A dual-tuner device delivers tuner A and tuner B through two independent
//! stream callbacks. [`Synchro`] pairs each A block with the following B block,
//! stores both in a shared ring and hands fixed-size, four-channel frames to a
//! [`SynchroHandler`].
//!
//! Pairing assumptions:
//! 1. Both streams run at the same effective sample rate.
//! 2. A and B callbacks alternate strictly (A, B, A, B, ...).
//! 3. A B block has the same length as the A block before it and covers the
//!    same time span.
//!
//! Violations are reported as [`SynchroEvent::OutOfSync`] and the offending
//! block is discarded; the next correct A/B pair re-synchronizes.

use std::fmt;

const XIA: usize = 0;
const XQA: usize = 1;
const XIB: usize = 2;
const XQB: usize = 3;
const NUM_CHANNELS: usize = 4;

/// Minimum ring capacity per channel, in samples
const MIN_CAPACITY: usize = 10 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynchroEvent {
    Message,
    Reset,
    Sync,
    OutOfSync,
}

impl fmt::Display for SynchroEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SynchroEvent::Message => "SynchroMessage",
            SynchroEvent::Reset => "SynchroReset",
            SynchroEvent::Sync => "SynchroSync",
            SynchroEvent::OutOfSync => "SynchroOutOfSync",
        };
        f.write_str(name)
    }
}

/// One time-aligned block of samples from both tuners.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    xia: &'a [i16],
    xqa: &'a [i16],
    xib: &'a [i16],
    xqb: &'a [i16],
    reset: bool,
}

impl<'a> Frame<'a> {
    /// # Panics
    ///
    /// Panics if the four components differ in length. Every producer in this
    /// crate validates lengths before building a frame, so a mismatch here is
    /// a programming error.
    pub fn new(xia: &'a [i16], xqa: &'a [i16], xib: &'a [i16], xqb: &'a [i16], reset: bool) -> Self {
        let n = xia.len();
        assert!(
            xqa.len() == n && xib.len() == n && xqb.len() == n,
            "mismatched buffer lengths; {}, {}, {}, {}",
            xia.len(),
            xqa.len(),
            xib.len(),
            xqb.len()
        );
        Self { xia, xqa, xib, xqb, reset }
    }

    pub fn xia(&self) -> &'a [i16] {
        self.xia
    }

    pub fn xqa(&self) -> &'a [i16] {
        self.xqa
    }

    pub fn xib(&self) -> &'a [i16] {
        self.xib
    }

    pub fn xqb(&self) -> &'a [i16] {
        self.xqb
    }

    /// True on the first frame after a reset
    pub fn reset(&self) -> bool {
        self.reset
    }

    /// Samples per component
    pub fn len(&self) -> usize {
        self.xia.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xia.is_empty()
    }
}

/// Receives synchronized frames and synchronizer events.
///
/// Both methods run on the hardware callback thread and must not block.
pub trait SynchroHandler {
    fn on_frame(&mut self, frame: Frame<'_>);

    fn on_event(&mut self, _event: SynchroEvent, _detail: &str) {}
}

/// Four co-indexed channels in one contiguous allocation
struct Ring {
    buf: Vec<i16>,
    capacity: usize,
}

impl Ring {
    fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; NUM_CHANNELS * capacity],
            capacity,
        }
    }

    fn channel(&self, ch: usize) -> &[i16] {
        &self.buf[ch * self.capacity..(ch + 1) * self.capacity]
    }

    /// Copy `src` into channel `ch` at `at`, splitting across the wrap point.
    /// `src` must not be longer than the capacity.
    fn write(&mut self, ch: usize, at: usize, src: &[i16]) {
        let base = ch * self.capacity;
        let head = (self.capacity - at).min(src.len());
        self.buf[base + at..base + at + head].copy_from_slice(&src[..head]);
        let tail = src.len() - head;
        self.buf[base..base + tail].copy_from_slice(&src[head..]);
    }
}

/// Pairs stream A and stream B callbacks into aligned frames of `chunk_len`
/// samples per channel.
pub struct Synchro<H> {
    chunk_len: usize,
    ring: Ring,
    write_idx: usize,
    emit_idx: usize,
    /// Samples written by the last A update that B has not consumed yet.
    /// Zero means it is A's turn.
    pending_a: usize,
    synchronized: bool,
    reset_latched: bool,
    handler: H,
}

impl<H: SynchroHandler> Synchro<H> {
    /// # Panics
    ///
    /// Panics if `chunk_len` is zero.
    pub fn new(chunk_len: usize, handler: H) -> Self {
        assert!(chunk_len > 0, "chunk length must be non-zero");

        // a multiple of chunk_len, so frames never straddle the wrap point
        let mut capacity = 10 * chunk_len;
        while capacity < MIN_CAPACITY {
            capacity *= 2;
        }

        Self {
            chunk_len,
            ring: Ring::new(capacity),
            write_idx: 0,
            emit_idx: 0,
            pending_a: 0,
            synchronized: false,
            reset_latched: true,
            handler,
        }
    }

    /// Samples per channel in every emitted frame
    pub fn chunk_len(&self) -> usize {
        self.chunk_len
    }

    /// Ring capacity per channel
    pub fn capacity(&self) -> usize {
        self.ring.capacity
    }

    pub fn is_synchronized(&self) -> bool {
        self.synchronized
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }

    /// Drop all buffered samples and pairing state. The next frame carries
    /// `reset = true`. Only call from the stream or event callback context.
    pub fn reset(&mut self) {
        self.handler.on_event(SynchroEvent::Reset, "synchro reset");
        self.pending_a = 0;
        self.write_idx = 0;
        self.emit_idx = 0;
        self.reset_latched = true;
        self.synchronized = false;
    }

    /// Stream A callback. Stores the block in the ring; frames are only
    /// emitted from [`stream_b`](Self::stream_b).
    pub fn stream_a(&mut self, xi: &[i16], xq: &[i16], reset: bool) {
        if reset {
            self.reset();
        }

        if xi.len() != xq.len() {
            self.out_of_sync(false, format_args!("len(xia)={} len(xqa)={}", xi.len(), xq.len()));
            return;
        }
        if self.pending_a != 0 {
            self.out_of_sync(false, format_args!("stream B has not been handled"));
            return;
        }
        if xi.len() > self.ring.capacity {
            let capacity = self.ring.capacity;
            self.out_of_sync(
                true,
                format_args!("len(xia)={} exceeds ring capacity {}", xi.len(), capacity),
            );
            return;
        }

        self.ring.write(XIA, self.write_idx, xi);
        self.ring.write(XQA, self.write_idx, xq);
        self.pending_a = xi.len();
    }

    /// Stream B callback. Validates the block against the pending A block,
    /// stores it and emits every frame whose boundary it crosses.
    ///
    /// `reset = true` here only marks the next frame; the state reset itself
    /// happens on the A side.
    pub fn stream_b(&mut self, xi: &[i16], xq: &[i16], reset: bool) {
        if xi.len() != xq.len() {
            self.out_of_sync(true, format_args!("len(xib)={} len(xqb)={}", xi.len(), xq.len()));
            return;
        }
        if self.pending_a == 0 {
            self.out_of_sync(true, format_args!("stream A has not been handled"));
            return;
        }
        if self.pending_a != xi.len() {
            let pending = self.pending_a;
            self.out_of_sync(true, format_args!("numSamplesA={} numSamplesB={}", pending, xi.len()));
            return;
        }
        self.reset_latched |= reset;

        if !self.synchronized {
            self.synchronized = true;
            let detail = format!("synchronized; numSamples={}", xi.len());
            self.handler.on_event(SynchroEvent::Sync, &detail);
        }

        let capacity = self.ring.capacity;
        let mut idx = self.write_idx;
        let mut off = 0;
        while off < xi.len() {
            let boundary = idx - idx % self.chunk_len + self.chunk_len;
            let take = (boundary - idx).min(xi.len() - off);
            self.ring.write(XIB, idx, &xi[off..off + take]);
            self.ring.write(XQB, idx, &xq[off..off + take]);
            idx += take;
            off += take;
            if idx == boundary {
                self.emit();
            }
            idx %= capacity;
        }

        self.write_idx = idx;
        // A's turn again
        self.pending_a = 0;
    }

    fn emit(&mut self) {
        let start = self.emit_idx;
        let end = start + self.chunk_len;
        self.emit_idx = end % self.ring.capacity;
        let reset = std::mem::replace(&mut self.reset_latched, false);

        let frame = Frame::new(
            &self.ring.channel(XIA)[start..end],
            &self.ring.channel(XQA)[start..end],
            &self.ring.channel(XIB)[start..end],
            &self.ring.channel(XQB)[start..end],
            reset,
        );
        self.handler.on_frame(frame);
    }

    /// Report a pairing violation once per loss of sync.
    fn out_of_sync(&mut self, desync: bool, detail: fmt::Arguments<'_>) {
        if !self.synchronized {
            return;
        }
        if desync {
            self.synchronized = false;
        }
        log::trace!("synchro out of sync: {}", detail);
        self.handler.on_event(SynchroEvent::OutOfSync, &detail.to_string());
    }
}
