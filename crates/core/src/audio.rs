//! Raw audio container conversion.
//!
//! The engine speaks exactly one audio format: 16-bit little-endian linear
//! PCM, mono, 24 kHz. This module wraps such raw samples in the canonical
//! minimal 44-byte RIFF/WAVE header and strips the same header off again.
//! It is not a general WAV parser: containers with extra metadata chunks or
//! reordered chunks will decode to corrupted audio rather than an error.

use crate::error::EngineError;

/// Sample rate the realtime service produces and consumes.
pub const SAMPLE_RATE: u32 = 24_000;
pub const CHANNELS: u16 = 1;
pub const BITS_PER_SAMPLE: u16 = 16;

/// Length of the canonical minimal RIFF/WAVE header.
pub const WAV_HEADER_LEN: usize = 44;

/// Wraps raw PCM bytes in a 44-byte RIFF/WAVE header. The sample bytes are
/// copied through unchanged.
pub fn pcm_to_wav(pcm: &[u8], sample_rate: u32, channels: u16, bits_per_sample: u16) -> Vec<u8> {
    let data_len = pcm.len() as u32;
    let byte_rate = sample_rate * u32::from(channels) * u32::from(bits_per_sample) / 8;
    let block_align = channels * bits_per_sample / 8;

    let mut out = Vec::with_capacity(WAV_HEADER_LEN + pcm.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    // Format code 1 = linear PCM.
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&bits_per_sample.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(pcm);
    out
}

/// Strips the canonical 44-byte header and returns the raw PCM bytes.
///
/// Only the minimal header layout produced by [`pcm_to_wav`] is supported;
/// non-canonical containers silently yield corrupted audio.
pub fn wav_to_pcm(container: &[u8]) -> Result<Vec<u8>, EngineError> {
    if container.len() < WAV_HEADER_LEN {
        return Err(EngineError::InvalidInput(format!(
            "container too short: {} bytes, need at least {}",
            container.len(),
            WAV_HEADER_LEN
        )));
    }
    Ok(container[WAV_HEADER_LEN..].to_vec())
}

/// Estimated playback length of raw PCM16 bytes at the given sample rate.
pub fn estimate_duration_secs(pcm: &[u8], sample_rate: u32) -> f64 {
    pcm.len() as f64 / 2.0 / f64::from(sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_wav_round_trip_is_bit_exact() {
        let pcm: Vec<u8> = (0..=255).cycle().take(4802).collect();
        let wav = pcm_to_wav(&pcm, SAMPLE_RATE, CHANNELS, BITS_PER_SAMPLE);
        assert_eq!(wav.len(), WAV_HEADER_LEN + pcm.len());
        assert_eq!(wav_to_pcm(&wav).unwrap(), pcm);
    }

    #[test]
    fn test_wav_round_trip_empty_payload() {
        let wav = pcm_to_wav(&[], SAMPLE_RATE, CHANNELS, BITS_PER_SAMPLE);
        assert_eq!(wav.len(), WAV_HEADER_LEN);
        assert!(wav_to_pcm(&wav).unwrap().is_empty());
    }

    #[test]
    fn test_header_layout() {
        let pcm = vec![0u8; 1000];
        let wav = pcm_to_wav(&pcm, SAMPLE_RATE, CHANNELS, BITS_PER_SAMPLE);

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(&wav[36..40], b"data");

        let overall = u32::from_le_bytes(wav[4..8].try_into().unwrap());
        let data_len = u32::from_le_bytes(wav[40..44].try_into().unwrap());
        assert_eq!(data_len, 1000);
        assert_eq!(overall, 36 + data_len);

        let format_code = u16::from_le_bytes(wav[20..22].try_into().unwrap());
        assert_eq!(format_code, 1);

        let rate = u32::from_le_bytes(wav[24..28].try_into().unwrap());
        let byte_rate = u32::from_le_bytes(wav[28..32].try_into().unwrap());
        let block_align = u16::from_le_bytes(wav[32..34].try_into().unwrap());
        let bits = u16::from_le_bytes(wav[34..36].try_into().unwrap());
        assert_eq!(rate, 24_000);
        assert_eq!(byte_rate, 24_000 * 1 * 16 / 8);
        assert_eq!(block_align, 2);
        assert_eq!(bits, 16);
    }

    #[test]
    fn test_header_layout_stereo_rates() {
        let wav = pcm_to_wav(&[0u8; 8], 16_000, 2, 16);
        let byte_rate = u32::from_le_bytes(wav[28..32].try_into().unwrap());
        let block_align = u16::from_le_bytes(wav[32..34].try_into().unwrap());
        assert_eq!(byte_rate, 16_000 * 2 * 16 / 8);
        assert_eq!(block_align, 4);
    }

    #[test]
    fn test_truncated_container_is_rejected() {
        let err = wav_to_pcm(&[0u8; 43]).unwrap_err();
        match err {
            EngineError::InvalidInput(msg) => assert!(msg.contains("43")),
            other => panic!("expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn test_duration_estimate() {
        // One second of 16-bit mono samples at 24 kHz is 48 000 bytes.
        let pcm = vec![0u8; 48_000];
        assert_abs_diff_eq!(
            estimate_duration_secs(&pcm, SAMPLE_RATE),
            1.0,
            epsilon = 1e-9
        );
        assert_abs_diff_eq!(estimate_duration_secs(&[], SAMPLE_RATE), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(
            estimate_duration_secs(&vec![0u8; 12_000], SAMPLE_RATE),
            0.25,
            epsilon = 1e-9
        );
    }
}
