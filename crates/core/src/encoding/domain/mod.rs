pub mod sequence_encoder;
