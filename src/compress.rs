use std::io::Write;

/// Content codings the server can deliver. Ordering of negotiation is fixed:
/// brotli > zstd > gzip > identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    Identity,
    Gzip,
    Brotli,
    Zstd,
}

impl Encoding {
    /// The Content-Encoding header value, `None` for identity.
    pub fn header_value(self) -> Option<&'static str> {
        match self {
            Encoding::Identity => None,
            Encoding::Gzip => Some("gzip"),
            Encoding::Brotli => Some("br"),
            Encoding::Zstd => Some("zstd"),
        }
    }
}

/// Per-codec effort settings, fixed when the cache is built. The defaults
/// spend startup time to shrink every response served afterwards.
#[derive(Clone, Copy, Debug)]
pub struct CompressionLevels {
    pub gzip: u32,
    pub brotli: i32,
    pub zstd: i32,
}

impl Default for CompressionLevels {
    fn default() -> Self {
        Self {
            gzip: 9,
            brotli: 11,
            zstd: 19,
        }
    }
}

pub fn compress_gzip(data: &[u8], level: u32) -> std::io::Result<Vec<u8>> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::new(level));
    encoder.write_all(data)?;
    encoder.finish()
}

pub fn compress_brotli(data: &[u8], quality: i32) -> std::io::Result<Vec<u8>> {
    let mut output = Vec::new();
    let params = brotli::enc::BrotliEncoderParams {
        quality,
        ..Default::default()
    };
    let mut reader = std::io::Cursor::new(data);
    brotli::BrotliCompress(&mut reader, &mut output, &params)?;
    Ok(output)
}

pub fn compress_zstd(data: &[u8], level: i32) -> std::io::Result<Vec<u8>> {
    zstd::encode_all(std::io::Cursor::new(data), level)
}
