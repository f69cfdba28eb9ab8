pub mod sample_converter;
