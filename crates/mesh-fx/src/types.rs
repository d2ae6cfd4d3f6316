//! Common audio types for Mesh FX
//!
//! Stereo sample and buffer types shared by the effect processors and the
//! engine-side registry.

use std::ops::{Index, IndexMut};

/// Default sample rate used throughout Mesh (48kHz - standard professional audio rate)
pub const SAMPLE_RATE: u32 = 48000;

/// Maximum buffer size to pre-allocate for real-time safety
///
/// Covers all common JACK configurations (64 .. 4096 frames). Engine chains
/// pre-allocate their dry buffers to this size on the control thread so the
/// audio callback never allocates.
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Audio sample type (32-bit float)
pub type Sample = f32;

/// A single stereo sample (left and right channels)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    /// Create a new stereo sample
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    /// Create a silent stereo sample
    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Create a mono sample (same value in both channels)
    #[inline]
    pub fn mono(value: Sample) -> Self {
        Self { left: value, right: value }
    }

    /// Get the peak amplitude (max of abs(left), abs(right))
    #[inline]
    pub fn peak(&self) -> Sample {
        self.left.abs().max(self.right.abs())
    }
}

impl std::ops::Add for StereoSample {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self {
            left: self.left + other.left,
            right: self.right + other.right,
        }
    }
}

impl std::ops::Mul<Sample> for StereoSample {
    type Output = Self;

    #[inline]
    fn mul(self, factor: Sample) -> Self {
        Self {
            left: self.left * factor,
            right: self.right * factor,
        }
    }
}

impl std::ops::MulAssign<Sample> for StereoSample {
    #[inline]
    fn mul_assign(&mut self, factor: Sample) {
        self.left *= factor;
        self.right *= factor;
    }
}

/// A buffer of stereo samples
///
/// The unit of work for one processing quantum. Buffers that live on the
/// audio thread are created with [`StereoBuffer::silence`] at
/// [`MAX_BUFFER_SIZE`] and resized with [`StereoBuffer::set_len_from_capacity`].
#[derive(Debug, Clone, Default)]
pub struct StereoBuffer {
    samples: Vec<StereoSample>,
}

impl StereoBuffer {
    /// Create a new empty buffer with the specified capacity (in stereo samples)
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    /// Create a buffer filled with silence
    pub fn silence(len: usize) -> Self {
        Self {
            samples: vec![StereoSample::silence(); len],
        }
    }

    /// Create a buffer from an existing Vec of StereoSamples
    pub fn from_vec(samples: Vec<StereoSample>) -> Self {
        Self { samples }
    }

    /// Get the number of stereo samples in the buffer
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of samples the buffer can hold without reallocating
    #[inline]
    pub fn capacity(&self) -> usize {
        self.samples.capacity()
    }

    /// Set the working length of a pre-allocated buffer (real-time safe)
    ///
    /// Fills any newly exposed elements with silence. Never allocates as
    /// long as `new_len <= capacity()`.
    #[inline]
    pub fn set_len_from_capacity(&mut self, new_len: usize) {
        let current_len = self.samples.len();
        if new_len > current_len {
            debug_assert!(
                new_len <= self.samples.capacity(),
                "set_len_from_capacity called with len > capacity"
            );
            self.samples.resize(new_len, StereoSample::silence());
        } else {
            self.samples.truncate(new_len);
        }
    }

    /// Fill the buffer with silence
    pub fn fill_silence(&mut self) {
        self.samples.fill(StereoSample::silence());
    }

    /// Get a slice of the samples
    #[inline]
    pub fn as_slice(&self) -> &[StereoSample] {
        &self.samples
    }

    /// Get a mutable slice of the samples
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [StereoSample] {
        &mut self.samples
    }

    /// Scale all samples by a factor
    pub fn scale(&mut self, factor: Sample) {
        for sample in &mut self.samples {
            *sample *= factor;
        }
    }

    /// Copy from another buffer (real-time safe if pre-allocated)
    ///
    /// Will not allocate if `self.capacity() >= other.len()`.
    pub fn copy_from(&mut self, other: &StereoBuffer) {
        let len = other.samples.len();
        debug_assert!(
            len <= self.samples.capacity(),
            "copy_from: insufficient capacity ({} < {})",
            self.samples.capacity(),
            len
        );
        self.set_len_from_capacity(len);
        self.samples[..len].copy_from_slice(&other.samples[..len]);
    }

    /// Get an iterator over the samples
    pub fn iter(&self) -> impl Iterator<Item = &StereoSample> {
        self.samples.iter()
    }

    /// Get a mutable iterator over the samples
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut StereoSample> {
        self.samples.iter_mut()
    }

    /// Get the peak amplitude in the buffer
    pub fn peak(&self) -> Sample {
        self.samples.iter().map(|s| s.peak()).fold(0.0, Sample::max)
    }
}

impl Index<usize> for StereoBuffer {
    type Output = StereoSample;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.samples[index]
    }
}

impl IndexMut<usize> for StereoBuffer {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.samples[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_sample_operations() {
        let a = StereoSample::new(1.0, 2.0);
        let b = StereoSample::new(0.5, 0.5);

        let sum = a + b;
        assert_eq!(sum.left, 1.5);
        assert_eq!(sum.right, 2.5);

        let scaled = a * 0.5;
        assert_eq!(scaled.left, 0.5);
        assert_eq!(scaled.right, 1.0);
        assert_eq!(StereoSample::new(-3.0, 2.0).peak(), 3.0);
    }

    #[test]
    fn test_set_len_from_capacity_keeps_allocation() {
        let mut buffer = StereoBuffer::silence(MAX_BUFFER_SIZE);
        let capacity = buffer.capacity();

        buffer.set_len_from_capacity(256);
        assert_eq!(buffer.len(), 256);
        buffer.set_len_from_capacity(1024);
        assert_eq!(buffer.len(), 1024);
        assert_eq!(buffer.capacity(), capacity);
    }

    #[test]
    fn test_copy_from() {
        let mut dst = StereoBuffer::silence(16);
        let src = StereoBuffer::from_vec(vec![StereoSample::mono(0.25); 8]);

        dst.copy_from(&src);
        assert_eq!(dst.len(), 8);
        assert_eq!(dst[7], StereoSample::mono(0.25));
    }
}
