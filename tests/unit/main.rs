//! Unit test modules.

mod ftms_commands_test;
mod ftms_decoder_test;
mod merge_buffer_test;
