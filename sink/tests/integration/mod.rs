mod codec_test;
mod processor_test;
