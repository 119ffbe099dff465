//! RIFF/WAVE reader over a memory-mapped file
//!
//! Integer PCM samples keep their raw integer scale (8-bit data is re-centred
//! on zero); float samples are passed through.

use crate::error::{Result, SpikeError};
use byteorder::{LittleEndian, ReadBytesExt};
use memmap2::Mmap;
use std::fs::File;
use std::io::Cursor;
use std::path::Path;

const FORMAT_PCM: u16 = 1;
const FORMAT_IEEE_FLOAT: u16 = 3;
const FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Open a file and map it into memory (read-only)
pub fn mmap_file(path: &Path) -> Result<Mmap> {
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(mmap)
}

/// Contents of the `fmt ` chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    pub audio_format: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl WavFormat {
    fn parse(chunk: &[u8]) -> Result<Self> {
        if chunk.len() < 16 {
            return Err(SpikeError::Format("WAV fmt chunk is truncated".to_string()));
        }
        let mut reader = Cursor::new(chunk);
        let mut audio_format = reader.read_u16::<LittleEndian>()?;
        let channels = reader.read_u16::<LittleEndian>()?;
        let sample_rate = reader.read_u32::<LittleEndian>()?;
        let _byte_rate = reader.read_u32::<LittleEndian>()?;
        let block_align = reader.read_u16::<LittleEndian>()?;
        let bits_per_sample = reader.read_u16::<LittleEndian>()?;

        if audio_format == FORMAT_EXTENSIBLE && chunk.len() >= 26 {
            // sub-format GUID starts at byte 24; its first two bytes are the real tag
            reader.set_position(24);
            audio_format = reader.read_u16::<LittleEndian>()?;
        }

        Ok(Self {
            audio_format,
            channels,
            sample_rate,
            block_align,
            bits_per_sample,
        })
    }

    fn validate(&self) -> Result<()> {
        let supported = matches!(
            (self.audio_format, self.bits_per_sample),
            (FORMAT_PCM, 8 | 16 | 24 | 32) | (FORMAT_IEEE_FLOAT, 32 | 64)
        );
        if !supported {
            return Err(SpikeError::Format(format!(
                "Unsupported WAV encoding (format tag {}, {} bits)",
                self.audio_format, self.bits_per_sample
            )));
        }
        if self.channels == 0 || self.sample_rate == 0 {
            return Err(SpikeError::Format(
                "WAV header declares no channels or a zero sample rate".to_string(),
            ));
        }
        let min_align = self.channels as usize * self.bytes_per_sample();
        if (self.block_align as usize) < min_align {
            return Err(SpikeError::Format(format!(
                "WAV block alignment {} is smaller than one frame ({} bytes)",
                self.block_align, min_align
            )));
        }
        Ok(())
    }

    /// Human-readable sample encoding, e.g. `16-bit PCM`.
    pub fn encoding(&self) -> String {
        match self.audio_format {
            FORMAT_PCM => format!("{}-bit PCM", self.bits_per_sample),
            FORMAT_IEEE_FLOAT => format!("{}-bit float", self.bits_per_sample),
            tag => format!("format tag {} ({} bits)", tag, self.bits_per_sample),
        }
    }

    fn bytes_per_sample(&self) -> usize {
        self.bits_per_sample as usize / 8
    }

    fn read_sample(&self, reader: &mut Cursor<&[u8]>) -> Result<f64> {
        let value = match (self.audio_format, self.bits_per_sample) {
            (FORMAT_PCM, 8) => reader.read_u8()? as f64 - 128.0,
            (FORMAT_PCM, 16) => reader.read_i16::<LittleEndian>()? as f64,
            (FORMAT_PCM, 24) => reader.read_i24::<LittleEndian>()? as f64,
            (FORMAT_PCM, 32) => reader.read_i32::<LittleEndian>()? as f64,
            (FORMAT_IEEE_FLOAT, 32) => reader.read_f32::<LittleEndian>()? as f64,
            (FORMAT_IEEE_FLOAT, 64) => reader.read_f64::<LittleEndian>()?,
            _ => {
                return Err(SpikeError::Format(format!(
                    "Unsupported WAV encoding (format tag {}, {} bits)",
                    self.audio_format, self.bits_per_sample
                )))
            }
        };
        Ok(value)
    }
}

/// Decoded WAV contents, one sample vector per channel
#[derive(Debug, Clone, PartialEq)]
pub struct WavData {
    pub format: WavFormat,
    pub samples: Vec<Vec<f64>>,
}

impl WavData {
    pub fn framerate(&self) -> u32 {
        self.format.sample_rate
    }
}

pub fn read_wav(path: &Path) -> Result<WavData> {
    let mmap = mmap_file(path)?;
    parse_wav(&mmap)
}

/// Parse a complete RIFF/WAVE image.
pub fn parse_wav(bytes: &[u8]) -> Result<WavData> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(SpikeError::Format("Not a RIFF/WAVE file".to_string()));
    }

    let mut format: Option<WavFormat> = None;
    let mut data: Option<&[u8]> = None;
    let mut offset = 12;

    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = Cursor::new(&bytes[offset + 4..offset + 8]).read_u32::<LittleEndian>()? as usize;
        let body_start = offset + 8;
        // writers that stream audio may leave the data size short or zero-filled
        let body_end = body_start.saturating_add(size).min(bytes.len());
        let body = &bytes[body_start..body_end];

        match id {
            b"fmt " => format = Some(WavFormat::parse(body)?),
            b"data" => data = Some(body),
            _ => log::debug!("Skipping WAV chunk {:?}", String::from_utf8_lossy(id)),
        }

        // chunks are word aligned
        offset = body_start.saturating_add(size).saturating_add(size & 1);
    }

    let format = format.ok_or_else(|| SpikeError::Format("WAV file has no fmt chunk".to_string()))?;
    let data = data.ok_or_else(|| SpikeError::Format("WAV file has no data chunk".to_string()))?;
    format.validate()?;

    let channels = format.channels as usize;
    let stride = format.block_align as usize;
    let frames = data.len() / stride;

    let mut samples: Vec<Vec<f64>> = (0..channels).map(|_| Vec::with_capacity(frames)).collect();
    let mut reader = Cursor::new(data);
    for frame in 0..frames {
        reader.set_position((frame * stride) as u64);
        for channel in samples.iter_mut() {
            channel.push(format.read_sample(&mut reader)?);
        }
    }

    log::info!(
        "Decoded WAV: {} channel(s), {} frame(s) at {} Hz, {}-bit",
        channels,
        frames,
        format.sample_rate,
        format.bits_per_sample
    );

    Ok(WavData { format, samples })
}
