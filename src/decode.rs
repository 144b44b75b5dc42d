use std::io::{self, Read};

use flate2::read::GzDecoder;
use tracing::debug;

const BROTLI_BUFFER_SIZE: usize = 4096;

/// Turns a response body into text according to its `Content-Encoding`.
///
/// Never fails: unknown encodings are read as-is and a broken stream falls
/// back to the raw bytes. Invalid UTF-8 is replaced, not rejected.
pub fn decode_body(raw: &[u8], content_encoding: Option<&str>) -> String {
    let encoding = content_encoding
        .map(|value| value.trim().to_ascii_lowercase())
        .unwrap_or_default();

    let inflated = match encoding.as_str() {
        "gzip" => inflate(GzDecoder::new(raw)),
        "br" => inflate(brotli::Decompressor::new(raw, BROTLI_BUFFER_SIZE)),
        _ => return String::from_utf8_lossy(raw).into_owned(),
    };

    match inflated {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(err) => {
            debug!(%encoding, %err, "body did not decompress, reading raw bytes");
            String::from_utf8_lossy(raw).into_owned()
        }
    }
}

fn inflate<R: Read>(mut reader: R) -> io::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    Ok(bytes)
}
