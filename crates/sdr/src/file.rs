// Copyright 2025-2026 CEMAXECUTER LLC

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::os::raw::c_uint;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use duo_stream::Result;

use crate::registry::{
    self, DeviceHandle, RawStreamParams, EVENT_DEVICE_REMOVED, TUNER_BOTH,
};
use crate::{DeviceCallbacks, DuoSource};

/// Bytes per dual-tuner frame on disk: AI, AQ, BI, BQ as int16 LE
const FRAME_BYTES: usize = 8;

/// Dual-tuner IQ file replay.
///
/// Reads a recording of interleaved AI,AQ,BI,BQ int16 little-endian frames
/// and plays it back the way the hardware runtime delivers a dual-tuner
/// stream: one tuner A callback followed by one tuner B callback per block,
/// routed through the callback registry under this source's device handle.
pub struct FileSource {
    path: String,
    handle: DeviceHandle,
    sample_rate: u32,
    /// Samples per tuner per callback
    block_size: usize,
    /// Skip delivering every Nth block to simulate hardware drops
    drop_every: Option<usize>,
    running: Arc<AtomicBool>,
}

/// Deinterleaved block buffers, reused across reads
struct Block {
    raw: Vec<u8>,
    xia: Vec<i16>,
    xqa: Vec<i16>,
    xib: Vec<i16>,
    xqb: Vec<i16>,
}

impl Block {
    fn new(block_size: usize) -> Self {
        Self {
            raw: vec![0u8; block_size * FRAME_BYTES],
            xia: Vec::with_capacity(block_size),
            xqa: Vec::with_capacity(block_size),
            xib: Vec::with_capacity(block_size),
            xqb: Vec::with_capacity(block_size),
        }
    }

    /// Read up to one block. Returns the number of complete frames read,
    /// 0 at end of file.
    fn read(&mut self, reader: &mut impl Read) -> io::Result<usize> {
        let mut filled = 0;
        while filled < self.raw.len() {
            match reader.read(&mut self.raw[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        let frames = filled / FRAME_BYTES;
        self.xia.clear();
        self.xqa.clear();
        self.xib.clear();
        self.xqb.clear();
        for f in self.raw[..frames * FRAME_BYTES].chunks_exact(FRAME_BYTES) {
            self.xia.push(i16::from_le_bytes([f[0], f[1]]));
            self.xqa.push(i16::from_le_bytes([f[2], f[3]]));
            self.xib.push(i16::from_le_bytes([f[4], f[5]]));
            self.xqb.push(i16::from_le_bytes([f[6], f[7]]));
        }
        Ok(frames)
    }
}

impl FileSource {
    pub fn new(path: impl Into<String>, sample_rate: u32) -> Self {
        Self {
            path: path.into(),
            handle: DeviceHandle::next(),
            sample_rate,
            block_size: 1008,
            drop_every: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_block_size(&mut self, size: usize) {
        self.block_size = size.max(1);
    }

    pub fn set_drop_every(&mut self, n: Option<usize>) {
        self.drop_every = n.filter(|&n| n > 0);
    }

    pub fn handle(&self) -> DeviceHandle {
        self.handle
    }

    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    fn replay(&mut self, reader: &mut impl Read) -> Result<()> {
        let ctx = self.handle.as_context();
        let mut block = Block::new(self.block_size);
        let mut sample_num: u32 = 0;
        let mut index: usize = 0;
        let mut reset = 1;

        while self.running.load(Ordering::SeqCst) {
            let frames = block.read(reader)?;
            if frames == 0 {
                log::info!("end of file: {}", self.path);
                break;
            }

            let params = RawStreamParams {
                first_sample_num: sample_num,
                num_samples: frames as c_uint,
                ..Default::default()
            };
            sample_num = sample_num.wrapping_add(frames as u32);
            index += 1;

            if self.drop_every.is_some_and(|n| index % n == 0) {
                log::debug!("dropping block {} ({} samples)", index, frames);
                continue;
            }

            unsafe {
                registry::stream_a_trampoline(
                    block.xia.as_ptr(),
                    block.xqa.as_ptr(),
                    &params,
                    frames as c_uint,
                    reset,
                    ctx,
                );
                registry::stream_b_trampoline(
                    block.xib.as_ptr(),
                    block.xqb.as_ptr(),
                    &params,
                    frames as c_uint,
                    reset,
                    ctx,
                );
            }
            reset = 0;
        }

        Ok(())
    }
}

impl DuoSource for FileSource {
    fn start(&mut self, callbacks: Box<dyn DeviceCallbacks>) -> Result<()> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::with_capacity(1024 * 1024, file);

        registry::init_callbacks(self.handle, callbacks)?;
        self.running.store(true, Ordering::SeqCst);
        log::info!(
            "replaying dual-tuner IQ from {} ({} Hz, {} samples per block)",
            self.path,
            self.sample_rate,
            self.block_size
        );

        let result = self.replay(&mut reader);

        // end of input looks like the device going away
        unsafe {
            registry::event_trampoline(EVENT_DEVICE_REMOVED, TUNER_BOTH, ptr::null(), self.handle.as_context());
        }
        self.running.store(false, Ordering::SeqCst);
        registry::uninit_callbacks(self.handle)?;
        log::info!("replay stopped");

        result
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duo_stream::{DeviceEvent, StreamParams, Tuner};
    use std::io::Write;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Log {
        calls: Vec<(char, Vec<i16>, StreamParams, bool)>,
        events: Vec<(Tuner, DeviceEvent)>,
    }

    struct Recorder(Arc<Mutex<Log>>);

    impl DeviceCallbacks for Recorder {
        fn stream_a(&mut self, xi: &[i16], _xq: &[i16], params: &StreamParams, reset: bool) {
            self.0.lock().unwrap().calls.push(('A', xi.to_vec(), *params, reset));
        }

        fn stream_b(&mut self, _xi: &[i16], xq: &[i16], params: &StreamParams, reset: bool) {
            self.0.lock().unwrap().calls.push(('B', xq.to_vec(), *params, reset));
        }

        fn event(&mut self, tuner: Tuner, event: DeviceEvent) {
            self.0.lock().unwrap().events.push((tuner, event));
        }
    }

    /// Write `n` frames where AI = k, AQ = 1000 + k, BI = 2000 + k, BQ = 3000 + k
    fn recording(n: i16) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for k in 0..n {
            for v in [k, 1000 + k, 2000 + k, 3000 + k] {
                file.write_all(&v.to_le_bytes()).unwrap();
            }
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_replay_alternates_a_and_b() {
        let file = recording(25);
        let log = Arc::new(Mutex::new(Log::default()));
        let mut source = FileSource::new(file.path().to_string_lossy(), 2_000_000);
        source.set_block_size(10);

        source.start(Box::new(Recorder(log.clone()))).unwrap();

        let log = log.lock().unwrap();
        let order: String = log.calls.iter().map(|c| c.0).collect();
        assert_eq!(order, "ABABAB");

        assert_eq!(log.calls[0].1, (0..10).collect::<Vec<i16>>());
        assert_eq!(log.calls[1].1, (3000..3010).collect::<Vec<i16>>());
        assert!(log.calls[0].3 && log.calls[1].3, "first pair carries reset");
        assert!(!log.calls[2].3);

        // trailing partial block
        assert_eq!(log.calls[4].1.len(), 5);
        assert_eq!(log.calls[4].2.first_sample_num, 20);
        assert_eq!(log.calls[4].2.num_samples, 5);

        assert_eq!(log.events, vec![(Tuner::Both, DeviceEvent::DeviceRemoved)]);
        assert!(registry::uninit_callbacks(source.handle()).is_err());
    }

    #[test]
    fn test_drop_injection_leaves_counter_gap() {
        let file = recording(40);
        let log = Arc::new(Mutex::new(Log::default()));
        let mut source = FileSource::new(file.path().to_string_lossy(), 2_000_000);
        source.set_block_size(10);
        source.set_drop_every(Some(2));

        source.start(Box::new(Recorder(log.clone()))).unwrap();

        let log = log.lock().unwrap();
        let firsts: Vec<u32> = log
            .calls
            .iter()
            .filter(|c| c.0 == 'A')
            .map(|c| c.2.first_sample_num)
            .collect();
        assert_eq!(firsts, vec![0, 20]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let log = Arc::new(Mutex::new(Log::default()));
        let mut source = FileSource::new("/nonexistent/duo.iq", 2_000_000);
        assert!(source.start(Box::new(Recorder(log))).is_err());
    }
}
