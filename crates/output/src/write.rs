// Copyright 2025-2026 CEMAXECUTER LLC

use std::io::{self, Write};

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use num_complex::Complex32;

/// Byte order of written samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    #[default]
    Little,
    Big,
}

/// Serializes sample slices with a selectable byte order.
///
/// Keeps one scratch buffer so each call is a single `write_all`.
#[derive(Debug)]
pub struct SampleWriter {
    endian: Endian,
    buf: Vec<u8>,
}

impl SampleWriter {
    pub fn new(endian: Endian) -> Self {
        Self {
            endian,
            buf: Vec::with_capacity(4096),
        }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Write int16 scalars; returns bytes written
    pub fn write_i16(&mut self, out: &mut impl Write, x: &[i16]) -> io::Result<usize> {
        self.buf.resize(x.len() * 2, 0);
        match self.endian {
            Endian::Little => LittleEndian::write_i16_into(x, &mut self.buf),
            Endian::Big => BigEndian::write_i16_into(x, &mut self.buf),
        }
        out.write_all(&self.buf)?;
        Ok(self.buf.len())
    }

    /// Write f32 scalars; returns bytes written
    pub fn write_f32(&mut self, out: &mut impl Write, x: &[f32]) -> io::Result<usize> {
        self.buf.resize(x.len() * 4, 0);
        match self.endian {
            Endian::Little => LittleEndian::write_f32_into(x, &mut self.buf),
            Endian::Big => BigEndian::write_f32_into(x, &mut self.buf),
        }
        out.write_all(&self.buf)?;
        Ok(self.buf.len())
    }

    /// Write complex samples as re,im f32 pairs; returns bytes written
    pub fn write_complex(&mut self, out: &mut impl Write, x: &[Complex32]) -> io::Result<usize> {
        self.buf.resize(x.len() * 8, 0);
        for (c, dst) in x.iter().zip(self.buf.chunks_exact_mut(8)) {
            match self.endian {
                Endian::Little => {
                    LittleEndian::write_f32(&mut dst[..4], c.re);
                    LittleEndian::write_f32(&mut dst[4..], c.im);
                }
                Endian::Big => {
                    BigEndian::write_f32(&mut dst[..4], c.re);
                    BigEndian::write_f32(&mut dst[4..], c.im);
                }
            }
        }
        out.write_all(&self.buf)?;
        Ok(self.buf.len())
    }
}
