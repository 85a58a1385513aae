//! WAV container helpers for 16-bit linear PCM.

use std::io::Cursor;

use hound::{SampleFormat, WavReader};

/// Format fields of a WAV upload plus its length in frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavInfo {
    pub sample_format: SampleFormat,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    /// Samples per channel.
    pub frames: u32,
}

impl WavInfo {
    pub fn is_linear_pcm(&self) -> bool {
        self.sample_format == SampleFormat::Int && self.bits_per_sample == 16
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.frames as u64 * 1000 / self.sample_rate as u64
    }
}

/// Read the header of an in-memory WAV file. Returns `None` for headerless
/// or malformed data.
pub fn parse_header(bytes: &[u8]) -> Option<WavInfo> {
    let reader = WavReader::new(Cursor::new(bytes)).ok()?;
    let spec = reader.spec();
    Some(WavInfo {
        sample_format: spec.sample_format,
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        bits_per_sample: spec.bits_per_sample,
        frames: reader.duration(),
    })
}

/// Audio fixtures for tests in this and dependent crates.
#[cfg(any(test, feature = "test-util"))]
pub mod fixtures {
    use std::io::Cursor;

    use hound::{SampleFormat, WavSpec, WavWriter};

    /// Wrap raw 16-bit PCM in a WAV container.
    pub fn pcm_to_wav(pcm: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).expect("wav header");
            for &sample in pcm {
                writer.write_sample(sample).expect("wav sample");
            }
            writer.finalize().expect("wav finalize");
        }
        cursor.into_inner()
    }

    /// `duration_ms` of silent 16-bit mono audio in a WAV container.
    pub fn silent_wav(duration_ms: u32, sample_rate: u32) -> Vec<u8> {
        let samples = (sample_rate as u64 * duration_ms as u64 / 1000) as usize;
        pcm_to_wav(&vec![0i16; samples], sample_rate, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{pcm_to_wav, silent_wav};
    use super::*;

    #[test]
    fn test_wav_header_generation() {
        let pcm = vec![0i16; 16000]; // 1 second at 16kHz
        let wav = pcm_to_wav(&pcm, 16000, 1);

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert!(wav.len() >= 44 + 16000 * 2);
    }

    #[test]
    fn test_parse_generated_header() {
        let wav = silent_wav(2000, 16000);
        let info = parse_header(&wav).expect("valid header");
        assert!(info.is_linear_pcm());
        assert_eq!(info.channels, 1);
        assert_eq!(info.sample_rate, 16000);
        assert_eq!(info.frames, 32_000);
        assert_eq!(info.duration_ms(), 2000);
    }

    #[test]
    fn test_parse_skips_extra_chunks() {
        let wav = silent_wav(10, 16000);
        let data_at = wav.windows(4).position(|w| w == b"data").unwrap();

        // Insert a LIST chunk before the data chunk.
        let mut patched = wav[..data_at].to_vec();
        patched.extend_from_slice(b"LIST");
        patched.extend_from_slice(&4u32.to_le_bytes());
        patched.extend_from_slice(b"INFO");
        patched.extend_from_slice(&wav[data_at..]);
        let riff_len = (patched.len() - 8) as u32;
        patched[4..8].copy_from_slice(&riff_len.to_le_bytes());

        let info = parse_header(&patched).expect("valid header");
        assert_eq!(info.frames, 160);
    }

    #[test]
    fn test_parse_stereo_rate() {
        let wav = pcm_to_wav(&[0i16; 4800], 24_000, 2);
        let info = parse_header(&wav).expect("valid header");
        assert_eq!(info.channels, 2);
        assert_eq!(info.sample_rate, 24_000);
        assert_eq!(info.duration_ms(), 100);
    }

    #[test]
    fn test_parse_rejects_raw_pcm() {
        assert_eq!(parse_header(&[0u8; 64]), None);
        assert_eq!(parse_header(b"RIFF"), None);
        // data chunk without fmt
        let mut bad = b"RIFF\x10\0\0\0WAVE".to_vec();
        bad.extend_from_slice(b"data\x04\0\0\0\0\0\0\0");
        assert_eq!(parse_header(&bad), None);
    }
}
