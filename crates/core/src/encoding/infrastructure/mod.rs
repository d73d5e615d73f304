pub mod ffmpeg_cli_encoder;
pub mod ffmpeg_lib_encoder;
