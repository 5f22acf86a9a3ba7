//! Frame sampler
//!
//! Decodes a raw video buffer and keeps an evenly spaced subset of frames,
//! each re-encoded as JPEG and paired with its timestamp.

#![allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]

use ffmpeg_next as ffmpeg;
use image::RgbImage;
use std::io::Write;
use std::path::Path;
use tracing::debug;
use video_moderation_common::{FrameSample, ModerationError, Result};

/// Sampler configuration
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Number of frames to keep across the video span
    pub target_samples: usize,
    /// Frame rate assumed when the container reports none
    pub fallback_fps: f64,
    /// JPEG quality for sampled frames (0-100)
    pub jpeg_quality: u8,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            target_samples: 10,
            fallback_fps: 25.0,
            jpeg_quality: 85,
        }
    }
}

/// Frames sampled from one video
#[derive(Debug, Clone)]
pub struct SampledFrames {
    /// Kept frames, timestamps strictly increasing
    pub frames: Vec<FrameSample>,
    /// Video duration in seconds
    pub duration: f64,
    /// Total frames in the source stream
    pub total_frames: u64,
}

/// Initialize the FFmpeg library
fn init_ffmpeg() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        ffmpeg::init().expect("Failed to initialize FFmpeg");
    });
}

/// Sample evenly spaced frames from a raw video buffer.
///
/// # Errors
///
/// Returns an error if:
/// - The container cannot be opened or has no video stream
/// - The total frame count cannot be determined, even by decoding
/// - No frames survive sampling
pub fn sample_frames(video: &[u8], config: &SamplerConfig) -> Result<SampledFrames> {
    init_ffmpeg();

    // FFmpeg wants a seekable path; the scratch file is unlinked on drop,
    // which covers every error return below.
    let mut scratch = tempfile::NamedTempFile::new()?;
    scratch.write_all(video)?;
    scratch.flush()?;
    let path = scratch.path();

    let (reported_frames, fps) = probe(path, config.fallback_fps)?;

    let total_frames = if reported_frames > 0 {
        reported_frames
    } else {
        debug!("container reports no frame count, counting by decoding");
        count_frames(path)?
    };

    if total_frames <= 0 {
        return Err(ModerationError::Decode(
            "could not determine video length".to_string(),
        ));
    }

    let target = config.target_samples.clamp(1, total_frames as usize);
    let interval = sampling_interval(total_frames as u64, target);

    let frames = decode_samples(path, interval, target, fps, config.jpeg_quality)?;
    if frames.is_empty() {
        return Err(ModerationError::Decode(
            "no frames survived sampling".to_string(),
        ));
    }

    debug!(
        samples = frames.len(),
        total_frames, fps, "sampled video frames"
    );

    Ok(SampledFrames {
        frames,
        duration: total_frames as f64 / fps,
        total_frames: total_frames as u64,
    })
}

/// Keep every `interval`-th decoded frame to land near the target count
fn sampling_interval(total_frames: u64, target: usize) -> u64 {
    std::cmp::max(1, total_frames / target as u64)
}

/// Read frame count and frame rate from the container metadata
fn probe(path: &Path, fallback_fps: f64) -> Result<(i64, f64)> {
    let ictx = ffmpeg::format::input(&path)
        .map_err(|e| ModerationError::Decode(format!("failed to open container: {e}")))?;

    let stream = ictx
        .streams()
        .best(ffmpeg::media::Type::Video)
        .ok_or(ModerationError::NoVideoStream)?;

    let rate = stream.avg_frame_rate();
    let fps = if rate.0 > 0 && rate.1 > 0 {
        f64::from(rate.0) / f64::from(rate.1)
    } else {
        fallback_fps
    };

    Ok((stream.frames(), fps))
}

/// Fallback for containers that do not report a frame count: decode the whole
/// stream and count frames directly.
fn count_frames(path: &Path) -> Result<i64> {
    let mut ictx = ffmpeg::format::input(&path)
        .map_err(|e| ModerationError::Decode(format!("failed to open container: {e}")))?;

    let (stream_index, parameters) = {
        let stream = ictx
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or(ModerationError::NoVideoStream)?;
        (stream.index(), stream.parameters())
    };

    let mut decoder = ffmpeg::codec::context::Context::from_parameters(parameters)
        .map_err(|e| ModerationError::Decode(format!("failed to create context: {e}")))?
        .decoder()
        .video()
        .map_err(|e| ModerationError::Decode(format!("failed to create decoder: {e}")))?;

    let mut frame = ffmpeg::util::frame::video::Video::empty();
    let mut count = 0i64;

    for (stream, packet) in ictx.packets() {
        if stream.index() != stream_index {
            continue;
        }
        if decoder.send_packet(&packet).is_ok() {
            while decoder.receive_frame(&mut frame).is_ok() {
                count += 1;
            }
        }
    }

    decoder.send_eof().ok();
    while decoder.receive_frame(&mut frame).is_ok() {
        count += 1;
    }

    Ok(count)
}

/// Walk the decoded frame stream keeping every `interval`-th frame until
/// `target` samples are collected or frames run out.
fn decode_samples(
    path: &Path,
    interval: u64,
    target: usize,
    fps: f64,
    jpeg_quality: u8,
) -> Result<Vec<FrameSample>> {
    let mut ictx = ffmpeg::format::input(&path)
        .map_err(|e| ModerationError::Decode(format!("failed to open container: {e}")))?;

    let (stream_index, parameters) = {
        let stream = ictx
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or(ModerationError::NoVideoStream)?;
        (stream.index(), stream.parameters())
    };

    let mut decoder = ffmpeg::codec::context::Context::from_parameters(parameters)
        .map_err(|e| ModerationError::Decode(format!("failed to create context: {e}")))?
        .decoder()
        .video()
        .map_err(|e| ModerationError::Decode(format!("failed to create decoder: {e}")))?;

    let width = decoder.width();
    let height = decoder.height();

    let mut scaler = ffmpeg::software::scaling::Context::get(
        decoder.format(),
        width,
        height,
        ffmpeg::format::Pixel::RGB24,
        width,
        height,
        ffmpeg::software::scaling::Flags::BILINEAR,
    )
    .map_err(|e| ModerationError::Decode(format!("failed to create scaler: {e}")))?;

    let mut samples = Vec::with_capacity(target);
    let mut frame_index = 0u64;
    let mut decoded = ffmpeg::util::frame::video::Video::empty();
    let mut converted = ffmpeg::util::frame::video::Video::empty();

    'demux: for (stream, packet) in ictx.packets() {
        if stream.index() != stream_index {
            continue;
        }
        if decoder.send_packet(&packet).is_ok() {
            while decoder.receive_frame(&mut decoded).is_ok() {
                if samples.len() >= target {
                    break 'demux;
                }
                if frame_index % interval == 0 {
                    scaler.run(&decoded, &mut converted).map_err(|e| {
                        ModerationError::Decode(format!("failed to convert frame: {e}"))
                    })?;
                    samples.push(FrameSample {
                        image: encode_jpeg(&converted, jpeg_quality)?,
                        timestamp: frame_index as f64 / fps,
                    });
                }
                frame_index += 1;
            }
        }
    }

    // Flush the decoder for frames still buffered at EOF
    if samples.len() < target {
        decoder.send_eof().ok();
        while decoder.receive_frame(&mut decoded).is_ok() {
            if samples.len() >= target {
                break;
            }
            if frame_index % interval == 0 {
                scaler.run(&decoded, &mut converted).map_err(|e| {
                    ModerationError::Decode(format!("failed to convert frame: {e}"))
                })?;
                samples.push(FrameSample {
                    image: encode_jpeg(&converted, jpeg_quality)?,
                    timestamp: frame_index as f64 / fps,
                });
            }
            frame_index += 1;
        }
    }

    Ok(samples)
}

/// Copy an RGB24 frame into a contiguous buffer and encode it as JPEG
fn encode_jpeg(frame: &ffmpeg::util::frame::video::Video, quality: u8) -> Result<Vec<u8>> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let stride = frame.stride(0);
    let plane = frame.data(0);

    // RGB24: single plane, 3 bytes per pixel, rows padded to the stride
    let mut data = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        let row_start = y * stride;
        data.extend_from_slice(&plane[row_start..row_start + width * 3]);
    }

    let img = RgbImage::from_vec(frame.width(), frame.height(), data)
        .ok_or_else(|| ModerationError::Decode("invalid RGB24 frame data".to_string()))?;

    let mut jpeg = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, quality);
    img.write_with_encoder(encoder)?;
    Ok(jpeg)
}
