//! JPEG marker-segment capture and splicing.
//!
//! Watermarking re-encodes the image, which drops whatever EXIF and IPTC
//! the camera or editor embedded. This module reads the original file's
//! raw APP1 (EXIF) and APP13 (Photoshop IPTC) segments before compositing
//! and splices them back into the freshly encoded JPEG, immediately after
//! SOI and in their original order.
//!
//! The parser is deliberately narrow: it walks length-prefixed marker
//! segments up to SOS and copies everything from SOS onward verbatim. Any
//! parse failure degrades to "skip metadata restore"; the image payload
//! is never put at risk.

use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt};

/// SOI marker, first two bytes of every JPEG.
const SOI: [u8; 2] = [0xFF, 0xD8];
/// APP1 marker byte (EXIF lives here).
const MARKER_APP1: u8 = 0xE1;
/// APP13 marker byte (Photoshop/IPTC lives here).
const MARKER_APP13: u8 = 0xED;
/// SOS marker byte; entropy-coded data follows.
const MARKER_SOS: u8 = 0xDA;

/// APP1 payloads carrying EXIF start with this signature.
const EXIF_SIGNATURE: &[u8] = b"Exif\0\0";
/// APP13 payloads carrying IPTC start with this signature.
const IPTC_SIGNATURE: &[u8] = b"Photoshop 3.0\0";

/// One raw marker segment: marker byte plus payload (length bytes
/// excluded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Marker byte (the `XX` of `FF XX`)
    pub marker: u8,
    /// Segment payload, without the two length bytes
    pub payload: Vec<u8>,
}

impl Segment {
    fn is_exif(&self) -> bool {
        self.marker == MARKER_APP1 && self.payload.starts_with(EXIF_SIGNATURE)
    }

    fn is_iptc(&self) -> bool {
        self.marker == MARKER_APP13 && self.payload.starts_with(IPTC_SIGNATURE)
    }

    fn is_preserved_kind(&self) -> bool {
        self.is_exif() || self.is_iptc()
    }

    /// TEM and RSTn carry no length field or payload.
    fn is_standalone(&self) -> bool {
        self.marker == 0x01 || (0xD0..=0xD7).contains(&self.marker)
    }
}

/// EXIF/IPTC segments captured from an original file, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataSegments {
    segments: Vec<Segment>,
}

impl MetadataSegments {
    /// True when nothing was captured; splicing is then a no-op.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of captured segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }
}

/// True when `bytes` begin with the JPEG SOI marker.
pub fn is_jpeg(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[..2] == SOI
}

/// Capture raw EXIF and IPTC segments from a JPEG.
///
/// Non-JPEG input or a malformed marker stream yields an empty capture;
/// restoring nothing is the degraded mode, not an error.
pub fn capture(bytes: &[u8]) -> MetadataSegments {
    match parse_segments(bytes) {
        Ok((segments, _)) => MetadataSegments {
            segments: segments.into_iter().filter(Segment::is_preserved_kind).collect(),
        },
        Err(reason) => {
            log::warn!("Skipping metadata capture: {}", reason);
            MetadataSegments::default()
        },
    }
}

/// Splice captured segments into a freshly encoded JPEG.
///
/// Encoder-inserted EXIF/IPTC segments are stripped first, then the
/// captured segments are inserted immediately after SOI in their original
/// byte order. On any parse failure the encoded bytes are returned
/// untouched.
pub fn splice(encoded: &[u8], captured: &MetadataSegments) -> Vec<u8> {
    if captured.is_empty() {
        return encoded.to_vec();
    }
    let (segments, tail) = match parse_segments(encoded) {
        Ok(parsed) => parsed,
        Err(reason) => {
            log::warn!("Skipping metadata splice: {}", reason);
            return encoded.to_vec();
        },
    };

    let mut out = Vec::with_capacity(encoded.len() + captured.segments.iter().map(|s| s.payload.len() + 4).sum::<usize>());
    out.extend_from_slice(&SOI);
    for segment in &captured.segments {
        write_segment(&mut out, segment);
    }
    for segment in segments.iter().filter(|s| !s.is_preserved_kind()) {
        write_segment(&mut out, segment);
    }
    out.extend_from_slice(tail);
    out
}

fn write_segment(out: &mut Vec<u8>, segment: &Segment) {
    out.push(0xFF);
    out.push(segment.marker);
    if segment.is_standalone() {
        return;
    }
    // Length counts itself; payloads longer than a segment can hold were
    // rejected by the parser on capture.
    out.extend_from_slice(&(segment.payload.len() as u16 + 2).to_be_bytes());
    out.extend_from_slice(&segment.payload);
}

/// Walk marker segments from SOI up to SOS.
///
/// Returns the header segments and the remainder of the file starting at
/// the SOS marker (or at EOI for images with no scan, which do not occur
/// in practice but parse cleanly).
fn parse_segments(bytes: &[u8]) -> std::result::Result<(Vec<Segment>, &[u8]), String> {
    if !is_jpeg(bytes) {
        return Err("missing SOI marker".to_string());
    }
    let mut segments = Vec::new();
    let mut pos = 2usize;
    loop {
        // Marker alignment: skip fill bytes (0xFF padding) before the
        // marker code.
        if pos >= bytes.len() {
            return Err("unexpected end of file before SOS".to_string());
        }
        if bytes[pos] != 0xFF {
            return Err(format!("expected marker at byte {}, found 0x{:02X}", pos, bytes[pos]));
        }
        let mut marker_pos = pos + 1;
        while marker_pos < bytes.len() && bytes[marker_pos] == 0xFF {
            marker_pos += 1;
        }
        if marker_pos >= bytes.len() {
            return Err("truncated marker".to_string());
        }
        let marker = bytes[marker_pos];

        if marker == MARKER_SOS {
            // Everything from SOS on (scan header + entropy data + EOI)
            // is copied verbatim by the splicer.
            return Ok((segments, &bytes[pos..]));
        }
        if marker == 0xD9 {
            // EOI with no scan.
            return Ok((segments, &bytes[pos..]));
        }
        if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            // Standalone, no length field. Kept as zero-payload segments
            // so the splicer writes them back in place.
            segments.push(Segment {
                marker,
                payload: Vec::new(),
            });
            pos = marker_pos + 1;
            continue;
        }

        let len_start = marker_pos + 1;
        if len_start + 2 > bytes.len() {
            return Err("truncated segment length".to_string());
        }
        let length = Cursor::new(&bytes[len_start..len_start + 2])
            .read_u16::<BigEndian>()
            .map_err(|e| e.to_string())? as usize;
        if length < 2 {
            return Err(format!("invalid segment length {} at byte {}", length, len_start));
        }
        let payload_start = len_start + 2;
        let payload_end = len_start + length;
        if payload_end > bytes.len() {
            return Err("segment overruns file".to_string());
        }
        segments.push(Segment {
            marker,
            payload: bytes[payload_start..payload_end].to_vec(),
        });
        pos = payload_end;
    }
}
