//! CSV edge for the replay binary: script input and balance output.

pub mod balance_writer;
pub mod script_reader;
