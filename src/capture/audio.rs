//! Audio stream writer
//!
//! Persists the mixed float output of the game as a 16-bit stereo PCM WAV.
//! The final length is unknown while recording, so a zeroed 44-byte header is
//! reserved up front and overwritten once the stream is finished.
//!
//! Appends come from the audio callback thread; `finish` comes from the
//! session shutdown path. Both go through the same lock and `finish` is
//! idempotent, so a late callback after shutdown is simply dropped.

use crate::capture::traits::AudioOutputConfig;
use parking_lot::Mutex as ParkingMutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Size of the RIFF/WAVE header
pub const WAV_HEADER_SIZE: u64 = 44;

/// Interleaved channel count of the mixed track
pub const CHANNELS: u16 = 2;

pub const BITS_PER_SAMPLE: u16 = 16;

const BLOCK_ALIGN: u16 = CHANNELS * BITS_PER_SAMPLE / 8;

const RESCALE_FACTOR: f32 = 32767.0;

/// Scratch space for one callback block, in bytes
const SCRATCH_CAPACITY: usize = 8192;

struct WriterState<W> {
    stream: Option<W>,
    /// Reused conversion buffer; grows only for oversized blocks
    scratch: Vec<u8>,
}

/// Append-only WAV writer shared between the audio callback and shutdown
pub struct AudioStreamWriter<W: Write + Seek = BufWriter<File>> {
    state: ParkingMutex<WriterState<W>>,
    sample_rate: u32,
    data_bytes: AtomicU64,
    running: AtomicBool,
    first_block_seen: AtomicBool,
    output_path: Option<PathBuf>,
}

impl AudioStreamWriter<BufWriter<File>> {
    /// Create a new WAV file; fails if one already exists at `path`
    pub fn create(path: &Path, config: AudioOutputConfig) -> io::Result<Self> {
        let file = OpenOptions::new().write(true).create_new(true).open(path)?;
        let mut writer = Self::from_stream(BufWriter::new(file), config)?;
        writer.output_path = Some(path.to_path_buf());

        tracing::info!(
            "Started audio writer: {}Hz {}ch, output: {:?}",
            config.sample_rate,
            CHANNELS,
            path
        );
        Ok(writer)
    }
}

impl<W: Write + Seek> AudioStreamWriter<W> {
    /// Wrap an arbitrary seekable stream, reserving the header region
    pub fn from_stream(mut stream: W, config: AudioOutputConfig) -> io::Result<Self> {
        stream.write_all(&[0u8; WAV_HEADER_SIZE as usize])?;

        Ok(Self {
            state: ParkingMutex::new(WriterState {
                stream: Some(stream),
                scratch: Vec::with_capacity(SCRATCH_CAPACITY),
            }),
            sample_rate: config.sample_rate,
            data_bytes: AtomicU64::new(0),
            running: AtomicBool::new(true),
            first_block_seen: AtomicBool::new(false),
            output_path: None,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Bytes of sample data appended so far
    pub fn data_bytes(&self) -> u64 {
        self.data_bytes.load(Ordering::Relaxed)
    }

    /// Append one interleaved block of normalized float samples
    ///
    /// Returns false once the writer is finished or the write failed.
    pub fn write_block(&self, data: &[f32]) -> bool {
        if !self.running.load(Ordering::Relaxed) {
            return false;
        }

        if !self.first_block_seen.swap(true, Ordering::Relaxed) {
            tracing::debug!("First audio block received ({} samples)", data.len());
        }

        let mut guard = self.state.lock();
        let WriterState { stream, scratch } = &mut *guard;
        let Some(stream) = stream.as_mut() else {
            return false;
        };

        scratch.clear();
        for &sample in data {
            let value = (sample * RESCALE_FACTOR) as i16;
            scratch.extend_from_slice(&value.to_le_bytes());
        }

        match stream.write_all(&scratch[..]) {
            Ok(()) => {
                self.data_bytes.fetch_add(scratch.len() as u64, Ordering::Relaxed);
                true
            }
            Err(e) => {
                tracing::error!("Audio write failed: {}", e);
                false
            }
        }
    }

    /// Finalize the header and hand back the stream
    ///
    /// Returns `Ok(None)` if the writer was already finished.
    pub fn finish_into_inner(&self) -> io::Result<Option<W>> {
        self.running.store(false, Ordering::Relaxed);

        let Some(mut stream) = self.state.lock().stream.take() else {
            return Ok(None);
        };

        let data_len = self.data_bytes();
        let total_len = WAV_HEADER_SIZE + data_len;

        stream.seek(SeekFrom::Start(0))?;
        stream.write_all(&wav_header(self.sample_rate, total_len))?;
        stream.flush()?;

        tracing::info!("Audio written to file with {} bytes", total_len);
        Ok(Some(stream))
    }

    /// Finalize the header and close the stream
    ///
    /// Returns the final byte length, or `None` if already finished.
    pub fn finish(&self) -> io::Result<Option<u64>> {
        Ok(self
            .finish_into_inner()?
            .map(|_| WAV_HEADER_SIZE + self.data_bytes()))
    }
}

fn clamp_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// Canonical 44-byte PCM header for a file of `total_len` bytes
pub fn wav_header(sample_rate: u32, total_len: u64) -> [u8; WAV_HEADER_SIZE as usize] {
    let mut header = [0u8; WAV_HEADER_SIZE as usize];

    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&clamp_u32(total_len.saturating_sub(8)).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes()); // PCM
    header[22..24].copy_from_slice(&CHANNELS.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&sample_rate.saturating_mul(BLOCK_ALIGN as u32).to_le_bytes());
    header[32..34].copy_from_slice(&BLOCK_ALIGN.to_le_bytes());
    header[34..36].copy_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(
        &clamp_u32(total_len.saturating_sub(WAV_HEADER_SIZE)).to_le_bytes(),
    );

    header
}

/// Sample rate of the host's default output device
#[cfg(feature = "device-audio")]
pub fn default_output_config() -> Option<AudioOutputConfig> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let device = host.default_output_device()?;

    match device.default_output_config() {
        Ok(config) => Some(AudioOutputConfig {
            sample_rate: config.sample_rate().0,
        }),
        Err(e) => {
            tracing::warn!("Failed to get audio output config: {}", e);
            None
        }
    }
}

/// Sample rate of the host's default output device
#[cfg(not(feature = "device-audio"))]
pub fn default_output_config() -> Option<AudioOutputConfig> {
    None
}
