//! Delimited-text row source backed by the `csv` reader.

use std::{io::Read, path::Path};

use anyhow::Result;
use csv::ByteRecord;
use encoding_rs::Encoding;

use crate::{io_utils, pipeline::RowSource};

/// Streams header and rows from a delimited text file (or stdin via `-`),
/// decoding each field with the configured encoding. Field counts are not
/// enforced here; ragged rows are the pipeline's per-row problem.
pub struct DelimitedRowSource {
    reader: csv::Reader<Box<dyn Read>>,
    encoding: &'static Encoding,
    record: ByteRecord,
}

impl DelimitedRowSource {
    pub fn open(path: &Path, delimiter: u8, encoding: &'static Encoding) -> Result<Self> {
        let reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
        Ok(Self {
            reader,
            encoding,
            record: ByteRecord::new(),
        })
    }
}

impl RowSource for DelimitedRowSource {
    fn header_fields(&mut self) -> Result<Vec<String>> {
        io_utils::reader_headers(&mut self.reader, self.encoding)
    }

    fn next_row(&mut self) -> Result<Option<Vec<String>>> {
        if self.reader.read_byte_record(&mut self.record)? {
            Ok(Some(io_utils::decode_record(&self.record, self.encoding)?))
        } else {
            Ok(None)
        }
    }
}
