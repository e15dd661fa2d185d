//! `Content-Encoding` handling for response bodies.
//!
//! Decoding is incremental: every compressed chunk is pushed through a
//! write-side `flate2` decoder and whatever it produced is yielded right away,
//! so large image downloads are never materialized unless the caller asks for
//! the whole body with [`read_to_bytes`].

use std::io::{self, Write};

use bytes::{Bytes, BytesMut};
use flate2::write::{GzDecoder, ZlibDecoder};
use futures::stream::{self, StreamExt};

use crate::http::ByteStream;

/// Transfer encodings the client advertises and understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Identity,
    Gzip,
    Deflate,
}

impl ContentEncoding {
    /// Unknown or absent tokens are treated as identity.
    pub fn from_header(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("gzip") | Some("x-gzip") => ContentEncoding::Gzip,
            Some("deflate") => ContentEncoding::Deflate,
            _ => ContentEncoding::Identity,
        }
    }
}

trait Inflate: Write + Send + 'static {
    fn output(&mut self) -> &mut Vec<u8>;
    fn finish_stream(&mut self) -> io::Result<()>;
}

impl Inflate for GzDecoder<Vec<u8>> {
    fn output(&mut self) -> &mut Vec<u8> {
        self.get_mut()
    }

    fn finish_stream(&mut self) -> io::Result<()> {
        self.try_finish()
    }
}

impl Inflate for ZlibDecoder<Vec<u8>> {
    fn output(&mut self) -> &mut Vec<u8> {
        self.get_mut()
    }

    fn finish_stream(&mut self) -> io::Result<()> {
        self.try_finish()
    }
}

/// Wrap `body` so that it yields decoded bytes.
pub fn decode_body(body: ByteStream, encoding: ContentEncoding) -> ByteStream {
    match encoding {
        ContentEncoding::Identity => body,
        ContentEncoding::Gzip => inflate(body, GzDecoder::new(Vec::new())),
        ContentEncoding::Deflate => inflate(body, ZlibDecoder::new(Vec::new())),
    }
}

struct Inflating<D> {
    body: ByteStream,
    decoder: D,
    seen_input: bool,
}

fn inflate<D: Inflate>(body: ByteStream, decoder: D) -> ByteStream {
    let state = Inflating {
        body,
        decoder,
        seen_input: false,
    };
    stream::unfold(Some(state), |state| async move {
        let mut state = state?;
        loop {
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    state.seen_input = true;
                    if let Err(e) = state
                        .decoder
                        .write_all(&chunk)
                        .and_then(|()| state.decoder.flush())
                    {
                        return Some((Err(e), None));
                    }
                    let out = std::mem::take(state.decoder.output());
                    if !out.is_empty() {
                        return Some((Ok(Bytes::from(out)), Some(state)));
                    }
                }
                Some(Err(e)) => return Some((Err(e), None)),
                None => {
                    if !state.seen_input {
                        return None;
                    }
                    if let Err(e) = state.decoder.finish_stream() {
                        return Some((Err(e), None));
                    }
                    let out = std::mem::take(state.decoder.output());
                    if out.is_empty() {
                        return None;
                    }
                    return Some((Ok(Bytes::from(out)), None));
                }
            }
        }
    })
    .boxed()
}

/// Drain a body stream into one buffer.
pub async fn read_to_bytes(mut body: ByteStream) -> io::Result<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = body.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}
