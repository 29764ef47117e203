// Copyright 2025-2026 CEMAXECUTER LLC

//! Interleaving of separate component buffers into a single sample stream.
//!
//! Both interleavers keep a persistent buffer between calls so the steady
//! state does not allocate. The returned slice borrows that buffer.

use duo_stream::Frame;

/// Interleaves one tuner's I and Q components: I0,Q0,I1,Q1,...
#[derive(Debug, Default)]
pub struct Interleave2 {
    buf: Vec<i16>,
}

impl Interleave2 {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(4096),
        }
    }

    /// Interleave up to the shorter of `xi` and `xq`
    pub fn interleave(&mut self, xi: &[i16], xq: &[i16]) -> &[i16] {
        self.buf.clear();
        self.buf.reserve(2 * xi.len().min(xq.len()));
        for (&i, &q) in xi.iter().zip(xq) {
            self.buf.extend_from_slice(&[i, q]);
        }
        &self.buf
    }
}

/// Interleaves both tuners: AI0,AQ0,BI0,BQ0,AI1,...
#[derive(Debug, Default)]
pub struct Interleave4 {
    buf: Vec<i16>,
}

impl Interleave4 {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(10 * 1024),
        }
    }

    /// Interleave up to the shortest of the four components
    pub fn interleave(&mut self, xia: &[i16], xqa: &[i16], xib: &[i16], xqb: &[i16]) -> &[i16] {
        let n = xia.len().min(xqa.len()).min(xib.len()).min(xqb.len());
        self.buf.clear();
        self.buf.resize(4 * n, 0);
        for (i, frame) in self.buf.chunks_exact_mut(4).enumerate() {
            frame[0] = xia[i];
            frame[1] = xqa[i];
            frame[2] = xib[i];
            frame[3] = xqb[i];
        }
        &self.buf
    }

    pub fn interleave_frame(&mut self, frame: &Frame<'_>) -> &[i16] {
        self.interleave(frame.xia(), frame.xqa(), frame.xib(), frame.xqb())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleave2_truncates_to_shorter() {
        let mut il = Interleave2::new();
        assert_eq!(il.interleave(&[1, 3, 5], &[2, 4]), &[1, 2, 3, 4]);
        assert_eq!(il.interleave(&[7], &[8, 9]), &[7, 8]);
    }

    #[test]
    fn test_interleave4_order() {
        let mut il = Interleave4::new();
        let out = il.interleave(&[0, 4], &[1, 5], &[2, 6], &[3, 7]);
        assert_eq!(out, &[0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_interleave4_grows_past_initial_buffer() {
        let n = 5000;
        let xia: Vec<i16> = (0..n).map(|k| (4 * k) as i16).collect();
        let xqa: Vec<i16> = (0..n).map(|k| (4 * k + 1) as i16).collect();
        let xib: Vec<i16> = (0..n).map(|k| (4 * k + 2) as i16).collect();
        let xqb: Vec<i16> = (0..n).map(|k| (4 * k + 3) as i16).collect();

        let mut il = Interleave4::new();
        let frame = Frame::new(&xia, &xqa, &xib, &xqb, false);
        let out = il.interleave_frame(&frame);
        assert_eq!(out.len(), 4 * n);
        assert!(out.iter().enumerate().all(|(k, &v)| v == k as i16));
    }
}
