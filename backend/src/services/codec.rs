use log::debug;
use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Decode(String),

    #[error("WAV encoding failed: {0}")]
    Encode(#[from] hound::Error),
}

impl From<SymphoniaError> for CodecError {
    fn from(e: SymphoniaError) -> Self {
        CodecError::Decode(e.to_string())
    }
}

/// Container facts read without decoding the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioInfo {
    pub sample_rate: u32,
    pub channels: usize,
    pub duration_secs: Option<f64>,
}

/// Decoded audio at its native rate, one buffer per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Decodes audio containers to samples and writes PCM WAV.
pub trait WaveformCodec: Send + Sync {
    fn probe(&self, path: &Path) -> Result<AudioInfo, CodecError>;

    fn decode(&self, path: &Path) -> Result<Waveform, CodecError>;

    /// `samples` are interleaved 16-bit frames.
    fn encode_wav(
        &self,
        samples: &[i16],
        channels: u16,
        sample_rate: u32,
    ) -> Result<Vec<u8>, CodecError>;
}

/// symphonia for reading, hound for writing.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaCodec;

impl SymphoniaCodec {
    fn open(&self, path: &Path) -> Result<Box<dyn FormatReader>, CodecError> {
        let file = File::open(path)?;
        let stream = MediaSourceStream::new(Box::new(file), Default::default());
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }
        let probed = symphonia::default::get_probe().format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        Ok(probed.format)
    }
}

impl WaveformCodec for SymphoniaCodec {
    fn probe(&self, path: &Path) -> Result<AudioInfo, CodecError> {
        let format = self.open(path)?;
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| CodecError::Decode("no audio track found".to_string()))?;
        let params = &track.codec_params;
        let sample_rate = params
            .sample_rate
            .ok_or_else(|| CodecError::Decode("unknown sample rate".to_string()))?;
        let channels = params.channels.map(|c| c.count()).unwrap_or(0);
        let duration_secs = params
            .n_frames
            .map(|frames| frames as f64 / sample_rate as f64);

        Ok(AudioInfo {
            sample_rate,
            channels,
            duration_secs,
        })
    }

    fn decode(&self, path: &Path) -> Result<Waveform, CodecError> {
        let mut format = self.open(path)?;
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| CodecError::Decode("no audio track found".to_string()))?;
        let track_id = track.id;
        let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
        let mut channel_count = track.codec_params.channels.map(|c| c.count()).unwrap_or(0);
        let mut decoder =
            symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

        let mut interleaved: Vec<f32> = Vec::new();
        let mut skipped_packets = 0usize;
        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(e.into()),
            };
            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    sample_rate = spec.rate;
                    channel_count = spec.channels.count();
                    let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    buffer.copy_interleaved_ref(decoded);
                    interleaved.extend_from_slice(buffer.samples());
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    skipped_packets += 1;
                    debug!("Skipping undecodable packet: {e}");
                }
                Err(e) => return Err(e.into()),
            }
        }

        if sample_rate == 0 || channel_count == 0 {
            return Err(CodecError::Decode("stream has no decodable audio".to_string()));
        }
        if skipped_packets > 0 {
            debug!("Skipped {skipped_packets} corrupt packet(s)");
        }

        let channels = (0..channel_count)
            .map(|c| {
                interleaved
                    .iter()
                    .skip(c)
                    .step_by(channel_count)
                    .copied()
                    .collect()
            })
            .collect();

        Ok(Waveform {
            channels,
            sample_rate,
        })
    }

    fn encode_wav(
        &self,
        samples: &[i16],
        channels: u16,
        sample_rate: u32,
    ) -> Result<Vec<u8>, CodecError> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(cursor.into_inner())
    }
}
