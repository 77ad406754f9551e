use crate::error::AudioError;
use crate::services::codec::{SymphoniaCodec, WaveformCodec};
use crate::services::dsp;
use log::{debug, info};
use std::io::Write;
use std::path::PathBuf;

/// Full-scale value used when quantizing to 16-bit PCM.
pub const PCM_FULL_SCALE: f32 = 32767.0;

/// Pitch/tempo transformation of an uploaded audio file into a WAV.
pub struct TransformPipeline<C: WaveformCodec = SymphoniaCodec> {
    codec: C,
    temp_dir: Option<PathBuf>,
}

impl Default for TransformPipeline<SymphoniaCodec> {
    fn default() -> Self {
        Self::new(SymphoniaCodec)
    }
}

impl<C: WaveformCodec> TransformPipeline<C> {
    pub fn new(codec: C) -> Self {
        TransformPipeline {
            codec,
            temp_dir: None,
        }
    }

    /// Stage uploads in `dir` instead of the system temp directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Shifts pitch by `pitch_steps` semitones, then stretches tempo by `tempo`.
    ///
    /// Parameters are checked before anything touches the disk. The staged
    /// copy of the upload is removed on every return path.
    pub fn transform(
        &self,
        audio: &[u8],
        pitch_steps: f64,
        tempo: f64,
    ) -> Result<Vec<u8>, AudioError> {
        validate_parameters(pitch_steps, tempo)?;
        info!("Processing audio with pitch_steps={pitch_steps}, tempo={tempo}");

        let mut builder = tempfile::Builder::new();
        builder.prefix("utone-upload-").suffix(".audio");
        let mut staged = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|e| AudioError::processing("staging", e))?;
        staged
            .write_all(audio)
            .and_then(|_| staged.flush())
            .map_err(|e| AudioError::processing("staging", e))?;
        debug!(
            "Saved {} bytes to temporary file: {}",
            audio.len(),
            staged.path().display()
        );

        let info = self
            .codec
            .probe(staged.path())
            .map_err(|e| AudioError::UnsupportedFormat(e.to_string()))?;
        debug!(
            "Audio file info: samplerate={}, channels={}, duration={:?}s",
            info.sample_rate, info.channels, info.duration_secs
        );

        let waveform = self
            .codec
            .decode(staged.path())
            .map_err(|e| AudioError::processing("decoding", e))?;
        debug!(
            "Loaded audio: {} channel(s) x {} frames at {} Hz ({:.2}s)",
            waveform.channels.len(),
            waveform.frames(),
            waveform.sample_rate,
            waveform.duration_secs()
        );

        let mut channels = waveform
            .channels
            .iter()
            .map(|samples| dsp::pitch_shift(samples, pitch_steps))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AudioError::processing("pitch shifting", e))?;

        if tempo != 1.0 {
            channels = channels
                .iter()
                .map(|samples| dsp::time_stretch(samples, tempo))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| AudioError::processing("time stretching", e))?;
        }

        let channel_count = u16::try_from(channels.len())
            .map_err(|_| AudioError::processing("encoding", "too many channels"))?;
        let pcm = interleave_pcm(&channels);
        let bytes = self
            .codec
            .encode_wav(&pcm, channel_count, waveform.sample_rate)
            .map_err(|e| AudioError::processing("encoding", e))?;

        info!("Converted to bytes: size={}", bytes.len());
        Ok(bytes)
    }
}

pub fn validate_parameters(pitch_steps: f64, tempo: f64) -> Result<(), AudioError> {
    if !pitch_steps.is_finite() {
        return Err(AudioError::InvalidParameter(format!(
            "pitch must be a finite number, got {pitch_steps}"
        )));
    }
    if !tempo.is_finite() || tempo <= 0.0 {
        return Err(AudioError::InvalidParameter(format!(
            "tempo must be a positive number, got {tempo}"
        )));
    }
    Ok(())
}

/// Scales by [`PCM_FULL_SCALE`] and interleaves. Out-of-range values saturate.
pub fn interleave_pcm(channels: &[Vec<f32>]) -> Vec<i16> {
    let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
    let mut pcm = Vec::with_capacity(frames * channels.len());
    for i in 0..frames {
        for channel in channels {
            pcm.push((channel[i] * PCM_FULL_SCALE) as i16);
        }
    }
    pcm
}
