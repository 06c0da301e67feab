// SPDX-License-Identifier: GPL-3.0-only

//! Raw pixel and sample conversion ahead of the encoders
//!
//! Video frames are converted to planar 4:2:0 with BT.601 limited-range
//! coefficients. Chroma is the average of each 2x2 block; odd edges reuse the
//! last row or column.

use crate::backends::camera::types::{Frame, PixelFormat};
use crate::errors::{MediaError, MediaResult};
use crate::media::encoders::{RawVideoFormat, SampleFormat};

/// Frame-to-4:2:0 converter bound to one geometry
///
/// Created on the first frame of a session and reused for every following
/// frame. A frame with a different input layout rebuilds the scratch rows.
#[derive(Debug)]
pub struct PixelConverter {
    width: u32,
    height: u32,
    target: RawVideoFormat,
    /// Per-pixel (Y, U, V) of two source rows
    rows: [Vec<(u8, i32, i32)>; 2],
}

#[inline]
fn rgb_to_yuv(r: i32, g: i32, b: i32) -> (u8, i32, i32) {
    let y = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
    let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
    let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
    (y.clamp(0, 255) as u8, u, v)
}

impl PixelConverter {
    pub fn new(width: u32, height: u32, target: RawVideoFormat) -> Self {
        let w = width as usize;
        Self {
            width,
            height,
            target,
            rows: [vec![(0, 0, 0); w], vec![(0, 0, 0); w]],
        }
    }

    pub fn target(&self) -> RawVideoFormat {
        self.target
    }

    fn load_row(slot: &mut [(u8, i32, i32)], frame: &Frame, y: u32) {
        let row = frame.row(y);
        match frame.format {
            PixelFormat::Gray8 => {
                for (out, &v) in slot.iter_mut().zip(row) {
                    let v = i32::from(v);
                    *out = rgb_to_yuv(v, v, v);
                }
            }
            PixelFormat::Rgb24 => {
                for (out, px) in slot.iter_mut().zip(row.chunks_exact(3)) {
                    *out = rgb_to_yuv(i32::from(px[0]), i32::from(px[1]), i32::from(px[2]));
                }
            }
            PixelFormat::Bgr24 => {
                for (out, px) in slot.iter_mut().zip(row.chunks_exact(3)) {
                    *out = rgb_to_yuv(i32::from(px[2]), i32::from(px[1]), i32::from(px[0]));
                }
            }
            PixelFormat::Rgba => {
                for (out, px) in slot.iter_mut().zip(row.chunks_exact(4)) {
                    *out = rgb_to_yuv(i32::from(px[0]), i32::from(px[1]), i32::from(px[2]));
                }
            }
        }
    }

    /// Convert one frame into a freshly allocated planar buffer
    pub fn convert(&mut self, frame: &Frame) -> MediaResult<Vec<u8>> {
        if frame.width != self.width || frame.height != self.height {
            return Err(MediaError::FrameSizeMismatch {
                expected: (self.width, self.height),
                actual: (frame.width, frame.height),
            });
        }
        frame
            .validate()
            .map_err(|e| MediaError::Encode(e.to_string()))?;

        let w = self.width as usize;
        let h = self.height as usize;
        let cw = self.width.div_ceil(2) as usize;
        let ch = self.height.div_ceil(2) as usize;
        let luma_len = w * h;
        let mut out = vec![0u8; self.target.frame_size(self.width, self.height)];
        let (luma, chroma) = out.split_at_mut(luma_len);

        for cy in 0..ch {
            let y0 = (cy * 2) as u32;
            let y1 = (y0 + 1).min(self.height - 1);
            let [top, bottom] = &mut self.rows;
            Self::load_row(top, frame, y0);
            Self::load_row(bottom, frame, y1);

            luma[y0 as usize * w..y0 as usize * w + w]
                .iter_mut()
                .zip(top.iter())
                .for_each(|(dst, px)| *dst = px.0);
            if y1 != y0 {
                luma[y1 as usize * w..y1 as usize * w + w]
                    .iter_mut()
                    .zip(bottom.iter())
                    .for_each(|(dst, px)| *dst = px.0);
            }

            for cx in 0..cw {
                let x0 = cx * 2;
                let x1 = (x0 + 1).min(w - 1);
                let u = (top[x0].1 + top[x1].1 + bottom[x0].1 + bottom[x1].1 + 2) / 4;
                let v = (top[x0].2 + top[x1].2 + bottom[x0].2 + bottom[x1].2 + 2) / 4;
                let (u, v) = (u.clamp(0, 255) as u8, v.clamp(0, 255) as u8);
                match self.target {
                    RawVideoFormat::I420 => {
                        chroma[cy * cw + cx] = u;
                        chroma[cw * ch + cy * cw + cx] = v;
                    }
                    RawVideoFormat::Nv12 => {
                        chroma[(cy * cw + cx) * 2] = u;
                        chroma[(cy * cw + cx) * 2 + 1] = v;
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Encoder-ready audio samples
#[derive(Debug, Clone, PartialEq)]
pub enum AudioSamples {
    F32(Vec<f32>),
    S16(Vec<i16>),
}

impl AudioSamples {
    pub fn len(&self) -> usize {
        match self {
            AudioSamples::F32(samples) => samples.len(),
            AudioSamples::S16(samples) => samples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Little-endian bytes in the sample's own format
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            AudioSamples::F32(samples) => samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
            AudioSamples::S16(samples) => samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
        }
    }
}

/// Convert interleaved S16LE bytes into the encoder's sample format
///
/// A trailing odd byte is ignored.
pub fn convert_samples(pcm: &[u8], format: SampleFormat) -> AudioSamples {
    let samples = pcm
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]));
    match format {
        SampleFormat::S16 => AudioSamples::S16(samples.collect()),
        SampleFormat::F32 => AudioSamples::F32(samples.map(|s| f32::from(s) / 32768.0).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_black_and_white_levels() {
        let mut image = RgbImage::from_pixel(4, 2, Rgb([0, 0, 0]));
        image.put_pixel(0, 0, Rgb([255, 255, 255]));
        let frame = Frame::from_rgb(image);
        let mut converter = PixelConverter::new(4, 2, RawVideoFormat::I420);
        let out = converter.convert(&frame).unwrap();

        assert_eq!(out.len(), 8 + 2 + 2);
        assert_eq!(out[0], 235);
        assert_eq!(out[1], 16);
        // Neutral chroma
        assert_eq!(out[8..], [128, 128, 128, 128]);
    }

    #[test]
    fn test_nv12_interleaves_chroma() {
        let image = RgbImage::from_pixel(2, 2, Rgb([255, 0, 0]));
        let frame = Frame::from_rgb(image);
        let mut i420 = PixelConverter::new(2, 2, RawVideoFormat::I420);
        let mut nv12 = PixelConverter::new(2, 2, RawVideoFormat::Nv12);
        let a = i420.convert(&frame).unwrap();
        let b = nv12.convert(&frame).unwrap();
        assert_eq!(a[..4], b[..4]);
        assert_eq!((a[4], a[5]), (b[4], b[5]));
        assert!(b[5] > 200);
    }

    #[test]
    fn test_bgr_matches_rgb() {
        let rgb = Frame::new(2, 2, PixelFormat::Rgb24, vec![10, 20, 200].repeat(4)).unwrap();
        let bgr = Frame::new(2, 2, PixelFormat::Bgr24, vec![200, 20, 10].repeat(4)).unwrap();
        let mut converter = PixelConverter::new(2, 2, RawVideoFormat::I420);
        assert_eq!(converter.convert(&rgb).unwrap(), converter.convert(&bgr).unwrap());
    }

    #[test]
    fn test_size_change_rejected() {
        let frame = Frame::from_rgb(RgbImage::new(4, 4));
        let mut converter = PixelConverter::new(2, 2, RawVideoFormat::I420);
        assert!(matches!(
            converter.convert(&frame),
            Err(MediaError::FrameSizeMismatch { .. })
        ));
    }

    #[test]
    fn test_sample_conversion() {
        let pcm = [0x00, 0x80, 0xff, 0x7f, 0x01];
        assert_eq!(convert_samples(&pcm, SampleFormat::S16), AudioSamples::S16(vec![i16::MIN, i16::MAX]));
        match convert_samples(&pcm, SampleFormat::F32) {
            AudioSamples::F32(samples) => {
                assert_eq!(samples[0], -1.0);
                assert!((samples[1] - 0.99997).abs() < 1e-4);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
