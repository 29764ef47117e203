// Copyright 2025-2026 CEMAXECUTER LLC

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use duo_output::convert::ToF32;
use duo_output::interleave::Interleave4;
use duo_output::write::{Endian, SampleWriter};
use duo_sdr::file::FileSource;
use duo_sdr::{DeviceCallbacks, DuoSource};
use duo_stream::{
    DeviceEvent, DropDetector, EventMsg, Frame, Handoff, StreamParams, Synchro, SynchroEvent,
    SynchroHandler, SynchroMsg, Tuner,
};

pub struct CaptureOptions {
    pub chunk_len: usize,
    pub depth: usize,
    pub block_size: usize,
    pub sample_rate: u32,
    pub float: bool,
    pub num_bits: u32,
    pub big_endian: bool,
    pub drop_every: Option<usize>,
    pub stats: bool,
}

/// Totals reported when a capture finishes
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CaptureSummary {
    pub frames: u64,
    pub samples: u64,
    /// Frames the writer never saw because the handoff queue was full
    pub lost_frames: u64,
    /// Frames that start a new synchronized run
    pub resets: u64,
    pub dropped_a: u64,
    pub dropped_b: u64,
    pub bytes: u64,
}

impl fmt::Display for CaptureSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frames: {} ({} samples/channel) lost: {} resets: {} dropped A: {} B: {} written: {} bytes",
            self.frames, self.samples, self.lost_frames, self.resets, self.dropped_a, self.dropped_b,
            self.bytes,
        )
    }
}

#[derive(Default)]
struct DropCounters {
    a: AtomicU64,
    b: AtomicU64,
}

/// Synchronizer output: frames go to the writer thread, events to the log
struct FrameSink {
    frames: Handoff<SynchroMsg>,
}

impl SynchroHandler for FrameSink {
    fn on_frame(&mut self, frame: Frame<'_>) {
        if !self.frames.publish_frame(&frame) {
            log::trace!("frame of {} samples not handed off", frame.len());
        }
    }

    fn on_event(&mut self, event: SynchroEvent, detail: &str) {
        match event {
            SynchroEvent::OutOfSync => log::warn!("{}: {}", event, detail),
            SynchroEvent::Sync => log::info!("{}: {}", event, detail),
            SynchroEvent::Reset | SynchroEvent::Message => log::debug!("{}: {}", event, detail),
        }
    }
}

/// Runs on the source's callback thread
struct DuoCallbacks {
    drops_a: DropDetector,
    drops_b: DropDetector,
    /// The last A block already forced a reset
    a_dropped: bool,
    /// B lost samples on its own; restart pairing at the next A block
    resync: bool,
    synchro: Synchro<FrameSink>,
    events: Handoff<EventMsg>,
    counters: Arc<DropCounters>,
}

impl DeviceCallbacks for DuoCallbacks {
    fn stream_a(&mut self, xi: &[i16], xq: &[i16], params: &StreamParams, reset: bool) {
        let dropped = self.drops_a.update_params(params, reset);
        if dropped > 0 {
            log::warn!("stream A dropped {} samples at {}", dropped, params.first_sample_num);
            self.counters.a.fetch_add(dropped as u64, Ordering::Relaxed);
        }
        self.a_dropped = dropped > 0;
        let resync = std::mem::take(&mut self.resync);
        self.synchro.stream_a(xi, xq, reset || dropped > 0 || resync);
    }

    fn stream_b(&mut self, xi: &[i16], xq: &[i16], params: &StreamParams, reset: bool) {
        let dropped = self.drops_b.update_params(params, reset);
        if dropped > 0 {
            log::warn!("stream B dropped {} samples at {}", dropped, params.first_sample_num);
            self.counters.b.fetch_add(dropped as u64, Ordering::Relaxed);
            if !self.a_dropped {
                self.resync = true;
            }
        }
        self.synchro.stream_b(xi, xq, reset || dropped > 0);
    }

    fn event(&mut self, tuner: Tuner, event: DeviceEvent) {
        self.events.publish_event(tuner, event);
    }
}

fn log_event(msg: &EventMsg) {
    match msg.event {
        DeviceEvent::GainChange {
            gr_db,
            lna_gr_db,
            curr_gain,
        } => log::info!(
            "tuner {:?}: gain reduction {} dB (LNA {} dB), system gain {:.1} dB",
            msg.tuner,
            gr_db,
            lna_gr_db,
            curr_gain
        ),
        DeviceEvent::PowerOverload(state) => {
            log::warn!("tuner {:?}: power overload {:?}", msg.tuner, state)
        }
        DeviceEvent::DeviceRemoved => log::info!("device removed"),
        DeviceEvent::DuoModeChange(change) => log::info!("dual-tuner mode change: {:?}", change),
    }
}

/// Replay a dual-tuner recording, synchronize both streams and write the
/// frames as interleaved AI,AQ,BI,BQ samples.
pub fn run_file(
    file_path: &Path,
    out_path: Option<&Path>,
    opts: &CaptureOptions,
) -> Result<CaptureSummary, String> {
    let mut writer: Option<BufWriter<File>> = match out_path {
        Some(path) => {
            let file = File::create(path)
                .map_err(|e| format!("failed to create {}: {}", path.display(), e))?;
            Some(BufWriter::new(file))
        }
        None => None,
    };

    let (frames, frames_rx) = Handoff::<SynchroMsg>::new(opts.depth);
    let (events, events_rx) = Handoff::<EventMsg>::new(opts.depth);
    let frames_closer = frames.closer();
    let events_closer = events.closer();
    let counters = Arc::new(DropCounters::default());

    let callbacks = DuoCallbacks {
        drops_a: DropDetector::new(),
        drops_b: DropDetector::new(),
        a_dropped: false,
        resync: false,
        synchro: Synchro::new(opts.chunk_len, FrameSink { frames }),
        events,
        counters: counters.clone(),
    };
    log::info!(
        "synchronizing {} samples per frame, ring capacity {}",
        opts.chunk_len,
        callbacks.synchro.capacity()
    );

    let mut source = FileSource::new(file_path.to_string_lossy().to_string(), opts.sample_rate);
    source.set_block_size(opts.block_size);
    source.set_drop_every(opts.drop_every);
    let running = source.running_flag();

    let event_thread = thread::spawn(move || {
        let mut next = 0u64;
        for msg in events_rx.iter() {
            if msg.seq != next {
                log::warn!("lost {} device events", msg.seq - next);
            }
            next = msg.seq + 1;
            log_event(&msg);
        }
    });

    // Callbacks (and with them both producers) are dropped when replay ends,
    // which ends the loops below
    let source_thread = thread::spawn(move || source.start(Box::new(callbacks)));

    let mut interleave = Interleave4::new();
    let mut to_f32 = ToF32::new(opts.num_bits);
    let endian = if opts.big_endian { Endian::Big } else { Endian::Little };
    let mut sample_writer = SampleWriter::new(endian);

    let mut summary = CaptureSummary::default();
    let mut next_seq = 0u64;
    let mut write_err: Option<String> = None;
    let stats_start = Instant::now();
    let mut last_stats = Instant::now();

    for msg in frames_rx.iter() {
        if msg.seq != next_seq {
            let lost = msg.seq - next_seq;
            log::warn!("writer fell behind, lost {} frames before {}", lost, msg.seq);
            summary.lost_frames += lost;
        }
        next_seq = msg.seq + 1;

        summary.frames += 1;
        summary.samples += msg.len() as u64;
        if msg.reset {
            summary.resets += 1;
            log::debug!("frame {} starts a synchronized run", msg.seq);
        }

        if let Some(ref mut w) = writer {
            let iq = interleave.interleave_frame(&msg.frame());
            let res = if opts.float {
                sample_writer.write_f32(w, to_f32.convert(iq))
            } else {
                sample_writer.write_i16(w, iq)
            };
            match res {
                Ok(n) => summary.bytes += n as u64,
                Err(e) => {
                    write_err = Some(format!("write failed: {}", e));
                    running.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }

        if opts.stats && last_stats.elapsed().as_secs() >= 5 {
            eprintln!("[{:.1}s] {}", stats_start.elapsed().as_secs_f64(), summary);
            last_stats = Instant::now();
        }
    }

    // Latch both handoffs so a producer still running stops publishing
    if let Err(e) = frames_closer.close() {
        log::debug!("frame handoff: {}", e);
    }
    if let Err(e) = events_closer.close() {
        log::debug!("event handoff: {}", e);
    }
    drop(frames_rx);

    let replay = source_thread
        .join()
        .map_err(|_| "source thread panicked".to_string())?;
    let _ = event_thread.join();

    if let Some(e) = write_err {
        return Err(e);
    }
    replay.map_err(|e| format!("replay failed: {}", e))?;

    if let Some(ref mut w) = writer {
        w.flush().map_err(|e| format!("write failed: {}", e))?;
    }

    summary.dropped_a = counters.a.load(Ordering::Relaxed);
    summary.dropped_b = counters.b.load(Ordering::Relaxed);
    log::info!("capture done ({:.1}s)", stats_start.elapsed().as_secs_f64());
    Ok(summary)
}
