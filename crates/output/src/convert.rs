// Copyright 2025-2026 CEMAXECUTER LLC

//! int16 to floating-point sample conversion.
//!
//! `num_bits` sets the scale: 16 (or more) maps the full int16 range onto
//! [-1, 1]. Fewer bits assumes a narrower ADC, but does not clip samples
//! that exceed it.

use num_complex::Complex32;

fn full_scale(num_bits: u32) -> f32 {
    let bits = num_bits.clamp(1, 16);
    (1u32 << (bits - 1)) as f32
}

/// Converts int16 scalars to f32 using a persistent output buffer
#[derive(Debug)]
pub struct ToF32 {
    scale: f32,
    buf: Vec<f32>,
}

impl ToF32 {
    pub fn new(num_bits: u32) -> Self {
        Self {
            scale: full_scale(num_bits),
            buf: Vec::with_capacity(4096),
        }
    }

    pub fn convert(&mut self, x: &[i16]) -> &[f32] {
        self.buf.clear();
        self.buf.extend(x.iter().map(|&v| v as f32 / self.scale));
        &self.buf
    }
}

/// Converts separate I and Q components to Complex32
#[derive(Debug)]
pub struct ToComplex {
    scale: f32,
    buf: Vec<Complex32>,
}

impl ToComplex {
    pub fn new(num_bits: u32) -> Self {
        Self {
            scale: full_scale(num_bits),
            buf: Vec::with_capacity(2048),
        }
    }

    /// Convert up to the shorter of `xi` and `xq`
    pub fn convert(&mut self, xi: &[i16], xq: &[i16]) -> &[Complex32] {
        let scale = self.scale;
        self.buf.clear();
        self.buf.extend(
            xi.iter()
                .zip(xq)
                .map(|(&i, &q)| Complex32::new(i as f32 / scale, q as f32 / scale)),
        );
        &self.buf
    }
}
