use std::path::Path;

use crate::encoding::domain::sequence_encoder::{EncoderError, SequenceEncoder};
use crate::shared::persisted_sequence::PersistedSequence;

/// Largest time-base denominator the MPEG-4 encoder accepts.
const MPEG4_MAX_TIME_BASE: i32 = 65535;

/// Encodes an on-disk sequence in-process via ffmpeg-next.
///
/// Each persisted image is decoded with the `image` crate, converted
/// RGB → YUV420P and encoded as MPEG-4 with a time base derived from the
/// declared frame rate. Odd dimensions are scaled down to the next even size.
pub struct FfmpegLibEncoder;

impl FfmpegLibEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FfmpegLibEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceEncoder for FfmpegLibEncoder {
    fn encode(
        &self,
        sequence: &PersistedSequence,
        frame_rate: f64,
        output: &Path,
    ) -> Result<(), EncoderError> {
        if sequence.directory().is_none() {
            return Err("in-memory sequences cannot be encoded".into());
        }
        if sequence.frame_count() == 0 {
            return Err("sequence has no frames".into());
        }
        if !frame_rate.is_finite() || frame_rate <= 0.0 {
            return Err(format!("invalid frame rate {frame_rate}").into());
        }

        ffmpeg_next::init()?;

        let first = load_rgb(sequence, 0)?;
        let (width, height) = (first.width(), first.height());
        let (out_w, out_h) = (even(width), even(height));
        let (num, den) = frame_rate_ratio(frame_rate);
        let time_base = ffmpeg_next::Rational(den, num);

        let mut octx = ffmpeg_next::format::output(output)?;
        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MPEG4)
            .ok_or("MPEG4 encoder not found")?;
        let mut ost = octx.add_stream(Some(codec))?;

        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()?;
        encoder_ctx.set_width(out_w);
        encoder_ctx.set_height(out_h);
        encoder_ctx.set_format(ffmpeg_next::format::Pixel::YUV420P);
        encoder_ctx.set_time_base(time_base);
        encoder_ctx.set_frame_rate(Some(ffmpeg_next::Rational(num, den)));
        if global_header {
            encoder_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        let mut encoder = encoder_ctx.open_with(ffmpeg_next::Dictionary::new())?;
        ost.set_parameters(&encoder);
        octx.write_header()?;
        let ost_time_base = octx.stream(0).ok_or("output stream missing")?.time_base();

        let mut scaler = ffmpeg_next::software::scaling::Context::get(
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::format::Pixel::YUV420P,
            out_w,
            out_h,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )?;

        log::info!(
            "Encoding {} frames ({width}x{height}) at {num}/{den} fps to {}",
            sequence.frame_count(),
            output.display()
        );

        let mut rgb_frame =
            ffmpeg_next::util::frame::video::Video::new(ffmpeg_next::format::Pixel::RGB24, width, height);
        let mut next = Some(first);

        for index in 0..sequence.frame_count() {
            let image = match next.take() {
                Some(image) => image,
                None => load_rgb(sequence, index)?,
            };
            if image.width() != width || image.height() != height {
                return Err(format!(
                    "frame {index} is {}x{}, expected {width}x{height}",
                    image.width(),
                    image.height()
                )
                .into());
            }

            copy_rows(&image, &mut rgb_frame);

            let mut yuv_frame = ffmpeg_next::util::frame::video::Video::empty();
            scaler.run(&rgb_frame, &mut yuv_frame)?;
            yuv_frame.set_pts(Some(index as i64));

            encoder.send_frame(&yuv_frame)?;
            write_packets(&mut encoder, &mut octx, time_base, ost_time_base)?;
        }

        encoder.send_eof()?;
        write_packets(&mut encoder, &mut octx, time_base, ost_time_base)?;
        octx.write_trailer()?;
        Ok(())
    }
}

fn load_rgb(sequence: &PersistedSequence, index: usize) -> Result<image::RgbImage, EncoderError> {
    let path = sequence
        .frame_path(index)
        .ok_or("in-memory sequences cannot be encoded")?;
    let image = image::open(&path).map_err(|e| format!("{}: {e}", path.display()))?;
    Ok(image.to_rgb8())
}

/// Copies packed RGB rows into a frame whose rows may be padded.
fn copy_rows(image: &image::RgbImage, frame: &mut ffmpeg_next::util::frame::video::Video) {
    let row_bytes = image.width() as usize * 3;
    let stride = frame.stride(0);
    let src = image.as_raw();
    let dst = frame.data_mut(0);
    for row in 0..image.height() as usize {
        let src_start = row * row_bytes;
        let dst_start = row * stride;
        dst[dst_start..dst_start + row_bytes]
            .copy_from_slice(&src[src_start..src_start + row_bytes]);
    }
}

fn write_packets(
    encoder: &mut ffmpeg_next::codec::encoder::video::Encoder,
    octx: &mut ffmpeg_next::format::context::Output,
    encoder_time_base: ffmpeg_next::Rational,
    stream_time_base: ffmpeg_next::Rational,
) -> Result<(), EncoderError> {
    let mut packet = ffmpeg_next::Packet::empty();
    while encoder.receive_packet(&mut packet).is_ok() {
        packet.set_stream(0);
        packet.rescale_ts(encoder_time_base, stream_time_base);
        packet.write_interleaved(octx)?;
    }
    Ok(())
}

fn even(value: u32) -> u32 {
    (value & !1).max(2)
}

/// Frame rate as a reduced `num/den` ratio with `num` within the MPEG-4
/// time-base limit, keeping up to three decimals.
pub fn frame_rate_ratio(frame_rate: f64) -> (i32, i32) {
    let mut den: i64 = 1000;
    while den > 1 && (frame_rate * den as f64).round() > MPEG4_MAX_TIME_BASE as f64 {
        den /= 10;
    }
    let num = ((frame_rate * den as f64).round() as i64).clamp(1, MPEG4_MAX_TIME_BASE as i64);
    let divisor = gcd(num, den);
    ((num / divisor) as i32, (den / divisor) as i32)
}

fn gcd(a: i64, b: i64) -> i64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}
