use std::fmt;

use flate2::{Decompress, FlushDecompress, Status};

/// The outcome of inflating one chunk.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InflateStatus {
    /// Input was consumed without reaching the end of the deflate stream,
    /// as expected for sync-flushed chunks.
    Ok,
    /// A final deflate block was decoded.
    StreamEnd,
    /// The stream was malformed or ended mid-block.  Chunked extraction
    /// tolerates this, since producers routinely leave the stream open.
    DataError,
    /// Inflation could not continue for the given reason.
    Fatal(&'static str),
}

impl InflateStatus {
    /// Returns true if chunked extraction accepts this status.
    pub fn is_tolerated(self) -> bool {
        !matches!(self, InflateStatus::Fatal(_))
    }
}

impl fmt::Display for InflateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InflateStatus::Ok => f.write_str("ok"),
            InflateStatus::StreamEnd => f.write_str("end of stream"),
            InflateStatus::DataError => f.write_str("data error"),
            InflateStatus::Fatal(reason) => write!(f, "fatal: {}", reason),
        }
    }
}

/// Status and byte counts of one inflate call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Inflated {
    /// How the call ended.
    pub status: InflateStatus,
    /// Compressed bytes consumed.
    pub total_in: u64,
    /// Bytes produced.
    pub total_out: u64,
}

/// A headerless deflate decoder, reset before every chunk.
pub struct RawInflater {
    decompressor: Decompress,
}

impl RawInflater {
    /// Creates a decoder for raw deflate data (no zlib header or checksum).
    pub fn new() -> RawInflater {
        RawInflater { decompressor: Decompress::new(false) }
    }

    /// Inflates `input` in one call into the spare capacity of `output`,
    /// which is cleared first and never grown.
    pub fn inflate(&mut self, input: &[u8], output: &mut Vec<u8>) -> Inflated {
        self.decompressor.reset(false);
        output.clear();
        let result = self.decompressor.decompress_vec(
            input,
            output,
            FlushDecompress::Finish,
        );
        let status = match result {
            Ok(Status::StreamEnd) => InflateStatus::StreamEnd,
            Ok(Status::Ok) => InflateStatus::Ok,
            Ok(Status::BufError) => {
                if self.decompressor.total_in() as usize + 1 >= input.len() {
                    InflateStatus::DataError
                } else {
                    InflateStatus::Fatal("output buffer exhausted")
                }
            }
            Err(error) => {
                log::trace!("Inflate reported {}", error);
                InflateStatus::DataError
            }
        };
        self.finish(status)
    }

    /// Inflates `input` with repeated non-flushing calls, stopping once at
    /// most one input byte remains or a call makes no progress.
    pub fn inflate_streaming(
        &mut self,
        input: &[u8],
        output: &mut Vec<u8>,
    ) -> Inflated {
        self.decompressor.reset(false);
        output.clear();
        let mut status = InflateStatus::Ok;
        while (self.decompressor.total_in() as usize) + 1 < input.len() {
            let consumed = self.decompressor.total_in();
            let produced = self.decompressor.total_out();
            let result = self.decompressor.decompress_vec(
                &input[consumed as usize..],
                output,
                FlushDecompress::None,
            );
            match result {
                Ok(Status::StreamEnd) => {
                    status = InflateStatus::StreamEnd;
                    break;
                }
                Ok(Status::Ok) | Ok(Status::BufError) => {
                    if self.decompressor.total_in() == consumed
                        && self.decompressor.total_out() == produced
                    {
                        status = if output.len() == output.capacity() {
                            InflateStatus::Fatal("output buffer exhausted")
                        } else {
                            InflateStatus::Fatal("no progress")
                        };
                        break;
                    }
                }
                Err(error) => {
                    log::trace!("Inflate reported {}", error);
                    status = InflateStatus::DataError;
                    break;
                }
            }
        }
        self.finish(status)
    }

    fn finish(&self, status: InflateStatus) -> Inflated {
        Inflated {
            status,
            total_in: self.decompressor.total_in(),
            total_out: self.decompressor.total_out(),
        }
    }
}

impl Default for RawInflater {
    fn default() -> RawInflater {
        RawInflater::new()
    }
}
