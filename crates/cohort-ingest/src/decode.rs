//! Text decoding of raw uploads.

use encoding_rs::{DecoderResult, Encoding};
use tracing::{debug, warn};

use crate::error::{IngestError, Result};

/// Upload decoded to UTF-8.
#[derive(Debug, Clone)]
pub struct DecodedText {
    pub text: String,
    /// Canonical name of the encoding actually used.
    pub encoding: &'static str,
    pub bom_removed: bool,
}

/// Decode `bytes` with the declared encoding label.
///
/// A byte-order mark wins over the declared label when the caller flagged it
/// or when it agrees with the label. Malformed input is an error naming the
/// 1-based data row it occurs on (0 for the header). Rows are delimited
/// records, so newlines inside quoted fields do not advance the row.
pub fn decode(
    bytes: &[u8],
    label: &str,
    bom_detected: bool,
    delimiter: u8,
) -> Result<DecodedText> {
    let declared =
        Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| {
            IngestError::UnsupportedEncoding {
                label: label.to_string(),
            }
        })?;

    let (encoding, payload, bom_removed) = match Encoding::for_bom(bytes) {
        Some((from_bom, bom_len)) if bom_detected || from_bom == declared => {
            (from_bom, &bytes[bom_len..], true)
        }
        _ => {
            if bom_detected {
                warn!(encoding = declared.name(), "caller flagged a BOM but none was found");
            }
            (declared, bytes, false)
        }
    };

    let mut decoder = encoding.new_decoder_without_bom_handling();
    let capacity = decoder
        .max_utf8_buffer_length_without_replacement(payload.len())
        .ok_or(IngestError::Encoding {
            row: 0,
            encoding: encoding.name(),
        })?;
    let mut text = String::with_capacity(capacity);
    let (result, _read) = decoder.decode_to_string_without_replacement(payload, &mut text, true);
    match result {
        DecoderResult::InputEmpty => {
            debug!(encoding = encoding.name(), bom_removed, "decoded upload");
            Ok(DecodedText {
                text,
                encoding: encoding.name(),
                bom_removed,
            })
        }
        DecoderResult::Malformed(_, _) | DecoderResult::OutputFull => Err(IngestError::Encoding {
            row: record_of_end(&text, delimiter),
            encoding: encoding.name(),
        }),
    }
}

/// Zero-based record index at the end of `prefix`; the header is record 0.
///
/// A sentinel byte starts a new record when `prefix` ends on a terminator and
/// joins the open record otherwise, so the last record read is the one the
/// decoder stopped in.
fn record_of_end(prefix: &str, delimiter: u8) -> u64 {
    let mut padded = String::with_capacity(prefix.len() + 1);
    padded.push_str(prefix);
    padded.push('x');
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(padded.as_bytes());
    let mut record = csv::ByteRecord::new();
    let mut records = 0u64;
    while let Ok(true) = reader.read_byte_record(&mut record) {
        records += 1;
    }
    records.saturating_sub(1)
}
